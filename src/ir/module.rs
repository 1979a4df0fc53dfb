//! Modules: the root of the IR graph.
//!
//! A [`Module`] owns every function, global variable and structure definition of a
//! compilation unit. Function handles stay valid for the lifetime of the module;
//! deleting a function only marks it removed.
//!
//! A freshly created module already declares the runtime library (I/O, string and
//! allocation helpers) as external functions.

use std::collections::BTreeMap;

use crate::{
    ir::{
        types::align_to, Constant, FuncId, Function, GlobalId, IrType, Operand, Param, StructDef,
        StructId,
    },
    Error, Result,
};

/// Runtime library functions that perform I/O.
pub const IO_BUILTINS: &[&str] = &[
    "print",
    "println",
    "printInt",
    "printlnInt",
    "getString",
    "getInt",
];

/// Initial value of a global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalInit {
    /// Zero-initialized storage.
    Zero,
    /// Integer constant.
    Int(i32),
    /// Boolean constant.
    Bool(bool),
    /// Null pointer.
    Null,
    /// NUL-terminated string literal (an `i8` array).
    Str(String),
}

/// A global variable. The operand `Operand::Global(id)` is its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    /// Symbol name.
    pub name: String,
    /// Type of the stored value.
    pub ty: IrType,
    /// Initializer.
    pub init: GlobalInit,
}

/// A compilation unit.
#[derive(Debug, Clone)]
pub struct Module {
    functions: Vec<Function>,
    globals: Vec<GlobalVariable>,
    structs: Vec<StructDef>,
    by_name: BTreeMap<String, FuncId>,
    string_count: usize,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Creates a module with the runtime library declared.
    #[must_use]
    pub fn new() -> Self {
        let mut module = Self {
            functions: Vec::new(),
            globals: Vec::new(),
            structs: Vec::new(),
            by_name: BTreeMap::new(),
            string_count: 0,
        };
        module.declare_builtins();
        module
    }

    fn declare_builtins(&mut self) {
        let string = IrType::pointer_to(IrType::I8);
        let s = |name: &str| Param::new(name, IrType::pointer_to(IrType::I8));
        let i = |name: &str| Param::new(name, IrType::I32);
        let builtins: Vec<(&str, IrType, Vec<Param>)> = vec![
            ("print", IrType::Void, vec![s("str")]),
            ("println", IrType::Void, vec![s("str")]),
            ("printInt", IrType::Void, vec![i("n")]),
            ("printlnInt", IrType::Void, vec![i("n")]),
            ("getString", string.clone(), vec![]),
            ("getInt", IrType::I32, vec![]),
            ("toString", string.clone(), vec![i("i")]),
            ("malloc", string.clone(), vec![i("size")]),
            ("__string_length", IrType::I32, vec![s("str")]),
            (
                "__string_substring",
                string.clone(),
                vec![s("str"), i("left"), i("right")],
            ),
            ("__string_parseInt", IrType::I32, vec![s("str")]),
            ("__string_ord", IrType::I32, vec![s("str"), i("pos")]),
            ("__string_concat", string.clone(), vec![s("lhs"), s("rhs")]),
            ("__string_equal", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__string_notEqual", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__string_lessThan", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__string_greaterThan", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__string_lessEqual", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__string_greaterEqual", IrType::I1, vec![s("lhs"), s("rhs")]),
            ("__array_size", IrType::I32, vec![s("array")]),
        ];
        for (name, ret, params) in builtins {
            self.insert(Function::new_external(name, ret, params));
        }
    }

    fn insert(&mut self, function: Function) -> FuncId {
        let id = FuncId::new(self.functions.len());
        self.by_name.insert(function.name().to_string(), id);
        self.functions.push(function);
        id
    }

    // ── Functions ───────────────────────────────────────────────────────

    /// Declares a function with an empty body. Build it through
    /// [`Module::function_mut`] and [`crate::ir::FunctionBuilder`].
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        ret_ty: IrType,
        params: Vec<Param>,
    ) -> FuncId {
        self.insert(Function::new(name, ret_ty, params))
    }

    /// Adds a fully built function.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.insert(function)
    }

    /// Function by handle.
    #[must_use]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Mutable function by handle.
    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    /// Looks up a live function by name.
    #[must_use]
    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name
            .get(name)
            .copied()
            .filter(|id| !self.functions[id.index()].is_removed())
    }

    /// Looks up a live function by name, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFunction`] when no live function has this name.
    pub fn require_function(&self, name: &str) -> Result<FuncId> {
        self.function_by_name(name)
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }

    /// Handles of all live functions, externals included.
    #[must_use]
    pub fn function_ids(&self) -> Vec<FuncId> {
        (0..self.functions.len())
            .map(FuncId::new)
            .filter(|id| !self.functions[id.index()].is_removed())
            .collect()
    }

    /// Handles of all live functions that have a body.
    #[must_use]
    pub fn defined_functions(&self) -> Vec<FuncId> {
        self.function_ids()
            .into_iter()
            .filter(|id| !self.functions[id.index()].is_external())
            .collect()
    }

    /// Number of function slots ever allocated, removed functions included.
    #[must_use]
    pub fn function_capacity(&self) -> usize {
        self.functions.len()
    }

    /// Temporarily takes a function out of the module so that it can be mutated
    /// while the rest of the module is read. Pair with [`Module::restore_function`].
    pub fn take_function(&mut self, id: FuncId) -> Function {
        std::mem::take(&mut self.functions[id.index()])
    }

    /// Puts back a function taken with [`Module::take_function`].
    pub fn restore_function(&mut self, id: FuncId, function: Function) {
        self.functions[id.index()] = function;
    }

    /// Deletes a function. Its handle stays allocated but is no longer listed.
    pub fn remove_function(&mut self, id: FuncId) {
        self.functions[id.index()].mark_removed();
    }

    /// Returns `true` for runtime library functions that perform I/O.
    #[must_use]
    pub fn is_io_builtin(&self, id: FuncId) -> bool {
        let f = self.function(id);
        f.is_external() && IO_BUILTINS.contains(&f.name())
    }

    // ── Globals ─────────────────────────────────────────────────────────

    /// Adds a global variable.
    pub fn add_global(&mut self, name: impl Into<String>, ty: IrType, init: GlobalInit) -> GlobalId {
        let id = GlobalId::new(self.globals.len());
        self.globals.push(GlobalVariable {
            name: name.into(),
            ty,
            init,
        });
        id
    }

    /// Adds a string literal as a constant byte array global.
    pub fn add_string_literal(&mut self, text: impl Into<String>) -> GlobalId {
        let name = format!(".str.{}", self.string_count);
        self.string_count += 1;
        self.add_global(name, IrType::I8, GlobalInit::Str(text.into()))
    }

    /// Global by handle.
    #[must_use]
    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.index()]
    }

    /// All globals in declaration order.
    #[must_use]
    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    // ── Types ───────────────────────────────────────────────────────────

    /// Adds a named structure.
    pub fn add_struct(&mut self, name: impl Into<String>, members: Vec<IrType>) -> StructId {
        let id = StructId::new(self.structs.len());
        self.structs.push(StructDef {
            name: name.into(),
            members,
        });
        id
    }

    /// Structure definition by handle.
    #[must_use]
    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.index()]
    }

    /// All structure definitions.
    #[must_use]
    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    /// Size in bytes of a type on the 32-bit target.
    #[must_use]
    pub fn size_of(&self, ty: &IrType) -> u32 {
        match ty {
            IrType::Struct(id) => {
                let def = self.struct_def(*id);
                let mut size = 0;
                let mut max = 1;
                for member in &def.members {
                    let member_size = self.size_of(member);
                    size = align_to(size, member_size) + member_size;
                    max = max.max(member_size);
                }
                align_to(size, max)
            }
            other => other.scalar_size().unwrap_or(0),
        }
    }

    /// Byte offset of member `index` within a structure.
    #[must_use]
    pub fn field_offset(&self, id: StructId, index: usize) -> u32 {
        let def = self.struct_def(id);
        let mut offset = 0;
        for (i, member) in def.members.iter().enumerate() {
            let member_size = self.size_of(member);
            offset = align_to(offset, member_size);
            if i == index {
                return offset;
            }
            offset += member_size;
        }
        offset
    }

    /// Type of an operand of function `func`.
    #[must_use]
    pub fn operand_ty(&self, func: &Function, op: Operand) -> IrType {
        match op {
            Operand::Global(g) => IrType::pointer_to(self.global(g).ty.clone()),
            Operand::Const(Constant::Null) => IrType::pointer_to(IrType::Void),
            other => func.operand_ty(other).unwrap_or(IrType::Void),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_declared() {
        let module = Module::new();
        let print = module.function_by_name("printInt").unwrap();
        assert!(module.function(print).is_external());
        assert!(module.is_io_builtin(print));
        let malloc = module.function_by_name("malloc").unwrap();
        assert!(!module.is_io_builtin(malloc));
        assert!(module.defined_functions().is_empty());
    }

    #[test]
    fn test_struct_layout() {
        let mut module = Module::new();
        let node = module.add_struct("Node", vec![IrType::I1, IrType::I32, IrType::I8]);
        assert_eq!(module.field_offset(node, 0), 0);
        assert_eq!(module.field_offset(node, 1), 4);
        assert_eq!(module.field_offset(node, 2), 8);
        assert_eq!(module.size_of(&IrType::Struct(node)), 12);
    }

    #[test]
    fn test_remove_function_hides_name() {
        let mut module = Module::new();
        let f = module.declare_function("foo", IrType::Void, vec![]);
        assert_eq!(module.function_by_name("foo"), Some(f));
        module.remove_function(f);
        assert_eq!(module.function_by_name("foo"), None);
        assert!(module.require_function("foo").is_err());
    }

    #[test]
    fn test_string_literals_are_globals() {
        let mut module = Module::new();
        let a = module.add_string_literal("hi");
        let b = module.add_string_literal("there");
        assert_ne!(module.global(a).name, module.global(b).name);
        assert_eq!(module.global(a).init, GlobalInit::Str("hi".into()));
    }
}
