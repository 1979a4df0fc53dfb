//! Assembly text emission.
//!
//! [`Assembly`] owns the allocated machine functions of a module together
//! with its global data and prints them in GNU `as` syntax for RV32IM:
//!
//! - `.text`: one `.globl` function per defined IR function
//! - `.data`: integer, boolean, pointer and zero-initialized globals
//! - `.rodata`: string literals as `.asciz`
//!
//! Stack slots are resolved to `sp` offsets while printing, which is why the
//! frame of each function must be final before emission.

use std::fmt::{self, Write};

use crate::{
    backend::mir::{Address, MBlockId, MFunction, MInst, Width},
    ir::{escape, GlobalInit, Module},
};

/// A global datum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    /// Symbol name.
    pub name: String,
    /// Contents.
    pub init: GlobalInit,
    /// Size in bytes.
    pub size: u32,
}

/// The compiled program.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    functions: Vec<MFunction>,
    data: Vec<DataItem>,
}

impl Assembly {
    /// Creates an assembly holding the globals of `module`.
    #[must_use]
    pub fn new(module: &Module) -> Self {
        let data = module
            .globals()
            .iter()
            .map(|g| DataItem {
                name: g.name.clone(),
                init: g.init.clone(),
                size: match &g.init {
                    GlobalInit::Str(text) => u32::try_from(text.len() + 1).unwrap_or(u32::MAX),
                    _ => module.size_of(&g.ty).max(1),
                },
            })
            .collect();
        Self {
            functions: Vec::new(),
            data,
        }
    }

    /// Appends an allocated function.
    pub fn push_function(&mut self, func: MFunction) {
        self.functions.push(func);
    }

    /// Emitted functions in order.
    #[must_use]
    pub fn functions(&self) -> &[MFunction] {
        &self.functions
    }

    /// Looks up an emitted function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&MFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Global data items.
    #[must_use]
    pub fn data(&self) -> &[DataItem] {
        &self.data
    }

    /// Total number of machine instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(MFunction::instruction_count).sum()
    }
}

fn address(func: &MFunction, addr: &Address) -> String {
    match addr {
        Address::Base { base, offset } => format!("{offset}({base})"),
        Address::Global { base, symbol } => format!("%lo({symbol})({base})"),
        Address::Frame { slot, offset } => format!("{}(sp)", func.frame.offset(*slot) + offset),
    }
}

/// Formats one instruction without indentation.
fn instruction(func: &MFunction, inst: &MInst) -> String {
    let label = |target: &MBlockId| {
        func.blocks
            .get(target.0)
            .map_or_else(|| format!("<bb{}>", target.0), |b| b.label.clone())
    };
    match inst {
        MInst::Li { rd, imm } => format!("li\t{rd}, {imm}"),
        MInst::LuiHi { rd, symbol } => format!("lui\t{rd}, %hi({symbol})"),
        MInst::Mv { rd, rs } => format!("mv\t{rd}, {rs}"),
        MInst::Alu { op, rd, rs1, rs2 } => format!("{op}\t{rd}, {rs1}, {rs2}"),
        MInst::AluImm { op, rd, rs1, imm } => format!("{op}\t{rd}, {rs1}, {imm}"),
        MInst::Seqz { rd, rs } => format!("seqz\t{rd}, {rs}"),
        MInst::Snez { rd, rs } => format!("snez\t{rd}, {rs}"),
        MInst::Load { width, rd, addr } => {
            let op = if *width == Width::Byte { "lb" } else { "lw" };
            format!("{op}\t{rd}, {}", address(func, addr))
        }
        MInst::Store { width, rs, addr } => {
            let op = if *width == Width::Byte { "sb" } else { "sw" };
            format!("{op}\t{rs}, {}", address(func, addr))
        }
        MInst::FrameAddr { rd, slot } => format!("addi\t{rd}, sp, {}", func.frame.offset(*slot)),
        MInst::Branch {
            op,
            rs1,
            rs2,
            target,
        } => format!("{op}\t{rs1}, {rs2}, {}", label(target)),
        MInst::Jump { target } => format!("j\t{}", label(target)),
        MInst::Call { callee, .. } => format!("call\t{callee}"),
        MInst::Ret { .. } => "ret".to_string(),
    }
}

fn write_function(out: &mut impl Write, func: &MFunction) -> fmt::Result {
    writeln!(out, "\t.globl\t{}", func.name)?;
    writeln!(out, "\t.p2align\t2")?;
    writeln!(out, "\t.type\t{},@function", func.name)?;
    writeln!(out, "{}:", func.name)?;
    for block in &func.blocks {
        writeln!(out, "{}:", block.label)?;
        for inst in &block.insts {
            writeln!(out, "\t{}", instruction(func, inst))?;
        }
    }
    writeln!(out, "\t.size\t{}, .-{}", func.name, func.name)
}

fn write_data(out: &mut impl Write, item: &DataItem) -> fmt::Result {
    match &item.init {
        GlobalInit::Str(text) => {
            writeln!(out, "{}:", item.name)?;
            writeln!(out, "\t.asciz\t\"{}\"", escape(text))?;
        }
        init => {
            writeln!(out, "\t.globl\t{}", item.name)?;
            writeln!(out, "\t.p2align\t2")?;
            writeln!(out, "{}:", item.name)?;
            match init {
                GlobalInit::Int(v) if item.size == 4 => writeln!(out, "\t.word\t{v}")?,
                GlobalInit::Int(v) => writeln!(out, "\t.byte\t{}", v & 0xff)?,
                GlobalInit::Bool(b) => writeln!(out, "\t.byte\t{}", u8::from(*b))?,
                GlobalInit::Null => writeln!(out, "\t.word\t0")?,
                _ => writeln!(out, "\t.zero\t{}", item.size)?,
            }
        }
    }
    writeln!(out, "\t.size\t{}, {}", item.name, item.size)
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t.text")?;
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write_function(f, func)?;
        }

        let (strings, data): (Vec<&DataItem>, Vec<&DataItem>) = self
            .data
            .iter()
            .partition(|d| matches!(d.init, GlobalInit::Str(_)));
        if !data.is_empty() {
            writeln!(f, "\n\t.section\t.data")?;
            for item in data {
                write_data(f, item)?;
            }
        }
        if !strings.is_empty() {
            writeln!(f, "\n\t.section\t.rodata")?;
            for item in strings {
                write_data(f, item)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            mir::{MBlock, Reg},
            target::PhysReg,
        },
        ir::IrType,
    };

    #[test]
    fn test_sections_and_symbols() {
        let mut module = Module::new();
        module.add_global("counter", IrType::I32, GlobalInit::Int(7));
        module.add_string_literal("hi\n");

        let mut asm = Assembly::new(&module);
        let mut f = MFunction::new("main");
        let slot = f.frame.add_spill();
        let mut block = MBlock::new(".Lmain.entry", 0);
        block.insts.push(MInst::Load {
            width: Width::Word,
            rd: Reg::Phys(PhysReg::A0),
            addr: Address::Frame { slot, offset: 0 },
        });
        block.insts.push(MInst::Ret { value: true });
        f.blocks.push(block);
        asm.push_function(f);

        let text = asm.to_string();
        assert!(text.starts_with("\t.text\n"));
        assert!(text.contains("main:\n.Lmain.entry:\n\tlw\ta0, 0(sp)\n\tret\n"));
        assert!(text.contains("\t.section\t.data\n\t.globl\tcounter"));
        assert!(text.contains("\t.word\t7"));
        assert!(text.contains("\t.section\t.rodata\n.str.0:\n\t.asciz\t\"hi\\n\""));
        assert!(text.find(".data").unwrap() < text.find(".rodata").unwrap());
        assert_eq!(asm.instruction_count(), 2);
        assert!(asm.function("main").is_some());
    }
}
