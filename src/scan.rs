//! Lazy reverse-lookup caches populated by scanning one method's bytecode at
//! a time. Caches only grow; the `scanned` bitmap is the one-way false→true
//! gate that makes [`Scanner::scan_method`] idempotent.

use std::cell::RefCell;
use std::collections::HashMap;

use log::trace;

use crate::dex::code_item::DecodedInstruction;
use crate::dex::container::DexContainer;
use crate::dex::instruction::opcodes;
use crate::tables::ImageTables;
use crate::Result;

#[derive(Default)]
pub struct ScanCaches {
    scanned: RefCell<Vec<bool>>,
    string_users: RefCell<HashMap<u32, Vec<u32>>>,
    field_getters: RefCell<HashMap<u32, Vec<u32>>>,
    field_setters: RefCell<HashMap<u32, Vec<u32>>>,
    invoking: RefCell<HashMap<u32, Vec<u32>>>,
    invoked: RefCell<HashMap<u32, Vec<u32>>>,
}

impl ScanCaches {
    pub fn new(num_methods: u32) -> Self {
        Self {
            scanned: RefCell::new(vec![false; num_methods as usize]),
            ..Default::default()
        }
    }

    pub fn is_scanned(&self, method_id: u32) -> bool {
        self.scanned
            .borrow()
            .get(method_id as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn string_users(&self, string_id: u32) -> Vec<u32> {
        self.string_users.borrow().get(&string_id).cloned().unwrap_or_default()
    }

    pub fn field_getters(&self, field_id: u32) -> Vec<u32> {
        self.field_getters.borrow().get(&field_id).cloned().unwrap_or_default()
    }

    pub fn field_setters(&self, field_id: u32) -> Vec<u32> {
        self.field_setters.borrow().get(&field_id).cloned().unwrap_or_default()
    }

    pub fn invoking(&self, caller: u32) -> Vec<u32> {
        self.invoking.borrow().get(&caller).cloned().unwrap_or_default()
    }

    pub fn invoked(&self, callee: u32) -> Vec<u32> {
        self.invoked.borrow().get(&callee).cloned().unwrap_or_default()
    }
}

pub struct Scanner;

impl Scanner {
    /// Decodes `method_id`'s bytecode (a no-op if it has none, or if it was
    /// already scanned) and updates every cache it touches. When
    /// `match_range` is `Some((low, high))`, returns whether a
    /// `const-string`/`const-string/jumbo` operand landed inside
    /// `[low, high)`.
    pub fn scan_method<'a, C: DexContainer<'a>>(
        tables: &ImageTables<'a, C>,
        caches: &ScanCaches,
        method_id: u32,
        match_range: Option<(u32, u32)>,
    ) -> Result<bool> {
        if caches.is_scanned(method_id) {
            return Ok(match_range
                .map(|(lo, hi)| {
                    (lo..hi).any(|s| caches.string_users(s).contains(&method_id))
                })
                .unwrap_or(false));
        }

        let mut matched = false;
        if let Some(&code_off) = tables.method_code_off.get(&method_id) {
            if let Some(accessor) = tables.reader.get_code_item_accessor(code_off)? {
                trace!("scanning method {method_id} ({} code units)", accessor.insns_size_in_code_units());
                for insn in accessor.instructions() {
                    matched |= Self::apply(caches, method_id, &insn, match_range);
                }
            }
        }

        caches.scanned.borrow_mut()[method_id as usize] = true;
        Ok(matched)
    }

    fn apply(caches: &ScanCaches, method_id: u32, insn: &DecodedInstruction, match_range: Option<(u32, u32)>) -> bool {
        match insn.opcode {
            opcodes::CONST_STRING => {
                let Some(&string_id) = insn.units.get(1) else { return false };
                let string_id = string_id as u32;
                caches.string_users.borrow_mut().entry(string_id).or_default().push(method_id);
                match_range.is_some_and(|(lo, hi)| (lo..hi).contains(&string_id))
            }
            opcodes::CONST_STRING_JUMBO => {
                if insn.units.len() < 3 {
                    return false;
                }
                let string_id = insn.units[1] as u32 | ((insn.units[2] as u32) << 16);
                caches.string_users.borrow_mut().entry(string_id).or_default().push(method_id);
                match_range.is_some_and(|(lo, hi)| (lo..hi).contains(&string_id))
            }
            op @ opcodes::IGET_FIRST..=opcodes::IGET_LAST => {
                Self::record_field(caches, method_id, insn, true);
                let _ = op;
                false
            }
            opcodes::IPUT_FIRST..=opcodes::IPUT_LAST => {
                Self::record_field(caches, method_id, insn, false);
                false
            }
            opcodes::SGET_FIRST..=opcodes::SGET_LAST => {
                Self::record_field(caches, method_id, insn, true);
                false
            }
            opcodes::SPUT_FIRST..=opcodes::SPUT_LAST => {
                Self::record_field(caches, method_id, insn, false);
                false
            }
            opcodes::INVOKE_FIRST..=opcodes::INVOKE_LAST | opcodes::INVOKE_RANGE_FIRST..=opcodes::INVOKE_RANGE_LAST => {
                if let Some(&callee_id) = insn.units.get(1) {
                    let callee_id = callee_id as u32;
                    caches.invoking.borrow_mut().entry(method_id).or_default().push(callee_id);
                    caches.invoked.borrow_mut().entry(callee_id).or_default().push(method_id);
                }
                false
            }
            _ => false,
        }
    }

    fn record_field(caches: &ScanCaches, method_id: u32, insn: &DecodedInstruction, is_get: bool) {
        let Some(&field_id) = insn.units.get(1) else { return };
        let field_id = field_id as u32;
        let map = if is_get { &caches.field_getters } else { &caches.field_setters };
        map.borrow_mut().entry(field_id).or_default().push(method_id);
    }
}
