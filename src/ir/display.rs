//! Textual IR dump in an LLVM-like syntax.

use std::fmt::{self, Write};

use crate::ir::{Constant, Function, GlobalInit, Inst, Module, Operand};

/// Borrowed view that prints one function of a module.
pub struct FunctionDisplay<'a> {
    module: &'a Module,
    func: &'a Function,
}

impl<'a> FunctionDisplay<'a> {
    /// Creates a printer for `func`.
    #[must_use]
    pub fn new(module: &'a Module, func: &'a Function) -> Self {
        Self { module, func }
    }

    fn operand(&self, op: Operand) -> String {
        match op {
            Operand::Reg(r) => format!("%{}", self.func.reg_name(r)),
            Operand::Param(i) => self
                .func
                .params()
                .get(i)
                .map_or_else(|| format!("%arg{i}"), |p| format!("%{}", p.name)),
            Operand::Global(g) => format!("@{}", self.module.global(g).name),
            Operand::Const(c) => c.to_string(),
        }
    }

    fn typed(&self, op: Operand) -> String {
        format!(
            "{} {}",
            self.module.operand_ty(self.func, op),
            self.operand(op)
        )
    }

    fn write_inst(&self, out: &mut String, inst: &Inst) -> fmt::Result {
        let f = self.func;
        match inst {
            Inst::Binary { op, dest, lhs, rhs } => write!(
                out,
                "%{} = {op} {}, {}",
                f.reg_name(*dest),
                self.typed(*lhs),
                self.operand(*rhs)
            ),
            Inst::Icmp {
                cond,
                dest,
                lhs,
                rhs,
            } => write!(
                out,
                "%{} = icmp {cond} {}, {}",
                f.reg_name(*dest),
                self.typed(*lhs),
                self.operand(*rhs)
            ),
            Inst::Load { dest, ptr } => write!(
                out,
                "%{} = load {}, {}",
                f.reg_name(*dest),
                f.reg_ty(*dest),
                self.typed(*ptr)
            ),
            Inst::Store { value, ptr } => {
                write!(out, "store {}, {}", self.typed(*value), self.typed(*ptr))
            }
            Inst::Alloca { dest, ty } => write!(out, "%{} = alloca {ty}", f.reg_name(*dest)),
            Inst::Gep { dest, ptr, indices } => {
                write!(
                    out,
                    "%{} = getelementptr {}",
                    f.reg_name(*dest),
                    self.typed(*ptr)
                )?;
                for index in indices {
                    write!(out, ", {}", self.typed(*index))?;
                }
                Ok(())
            }
            Inst::BitCast { dest, src } => write!(
                out,
                "%{} = bitcast {} to {}",
                f.reg_name(*dest),
                self.typed(*src),
                f.reg_ty(*dest)
            ),
            Inst::Phi { dest, incoming } => {
                write!(out, "%{} = phi {} ", f.reg_name(*dest), f.reg_ty(*dest))?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    write!(
                        out,
                        "[ {}, %{} ]",
                        self.operand(*value),
                        f.block_name(*block)
                    )?;
                }
                Ok(())
            }
            Inst::Call { dest, callee, args } => {
                let callee = self.module.function(*callee);
                if let Some(dest) = dest {
                    write!(out, "%{} = ", f.reg_name(*dest))?;
                }
                write!(out, "call {} @{}(", callee.ret_ty(), callee.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.typed(*arg));
                }
                out.push(')');
                Ok(())
            }
            Inst::Branch {
                cond,
                then_bb,
                else_bb,
            } => write!(
                out,
                "br i1 {}, label %{}, label %{}",
                self.operand(*cond),
                f.block_name(*then_bb),
                f.block_name(*else_bb)
            ),
            Inst::Jump { target } => write!(out, "br label %{}", f.block_name(*target)),
            Inst::Return { value: None } => write!(out, "ret void"),
            Inst::Return { value: Some(v) } => write!(out, "ret {}", self.typed(*v)),
            Inst::Move { dest, src } => write!(
                out,
                "%{} = move {}",
                f.reg_name(*dest),
                self.typed(*src)
            ),
            Inst::ParallelCopy { moves } => {
                out.push_str("parallel_copy");
                for (i, (dest, src)) in moves.iter().enumerate() {
                    out.push_str(if i == 0 { " " } else { ", " });
                    write!(out, "%{} <- {}", f.reg_name(*dest), self.operand(*src))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        let params: Vec<String> = func
            .params()
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.name))
            .collect();
        if func.is_external() {
            return writeln!(
                f,
                "declare {} @{}({})",
                func.ret_ty(),
                func.name(),
                params.join(", ")
            );
        }
        writeln!(
            f,
            "define {} @{}({}) {{",
            func.ret_ty(),
            func.name(),
            params.join(", ")
        )?;
        for (i, &block) in func.blocks().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let preds: Vec<&str> = func
                .preds(block)
                .iter()
                .map(|&p| func.block_name(p))
                .collect();
            if preds.is_empty() {
                writeln!(f, "{}:", func.block_name(block))?;
            } else {
                writeln!(
                    f,
                    "{}:{:width$}; preds = %{}",
                    func.block_name(block),
                    "",
                    preds.join(", %"),
                    width = 40usize.saturating_sub(func.block_name(block).len() + 1)
                )?;
            }
            for &inst in func.block_insts(block) {
                let mut line = String::new();
                self.write_inst(&mut line, func.inst(inst))?;
                writeln!(f, "    {line}")?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in self.structs() {
            let members: Vec<String> = def.members.iter().map(ToString::to_string).collect();
            writeln!(f, "%struct.{} = type {{ {} }}", def.name, members.join(", "))?;
        }
        for global in self.globals() {
            match &global.init {
                GlobalInit::Str(text) => writeln!(
                    f,
                    "@{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                    global.name,
                    text.len() + 1,
                    escape(text)
                )?,
                GlobalInit::Zero => {
                    writeln!(f, "@{} = global {} zeroinitializer", global.name, global.ty)?;
                }
                GlobalInit::Int(v) => writeln!(
                    f,
                    "@{} = global {} {}",
                    global.name,
                    global.ty,
                    Constant::Int(*v)
                )?,
                GlobalInit::Bool(b) => writeln!(
                    f,
                    "@{} = global {} {}",
                    global.name,
                    global.ty,
                    Constant::Bool(*b)
                )?,
                GlobalInit::Null => writeln!(f, "@{} = global {} null", global.name, global.ty)?,
            }
        }
        for id in self.function_ids() {
            writeln!(f)?;
            write!(f, "{}", FunctionDisplay::new(self, self.function(id)))?;
        }
        Ok(())
    }
}

/// Escapes a string literal for the IR and assembly printers.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, FunctionBuilder, IrType, Param};

    #[test]
    fn test_print_function() {
        let mut module = Module::new();
        let id = module.declare_function("twice", IrType::I32, vec![Param::new("x", IrType::I32)]);
        let mut b = FunctionBuilder::new(module.function_mut(id));
        let v = b.binary(BinaryOp::Add, Operand::Param(0), Operand::Param(0));
        b.ret(Some(v));
        b.finish().unwrap();

        let text = FunctionDisplay::new(&module, module.function(id)).to_string();
        assert!(text.starts_with("define i32 @twice(i32 %x) {"));
        assert!(text.contains("%add = add i32 %x, %x"));
        assert!(text.contains("ret i32 %ret"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\n\"b\""), "a\\n\\\"b\\\"");
    }
}
