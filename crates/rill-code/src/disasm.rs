//! Unit disassembler
//!
//! Diagnostic rendering only; the output is not a stable machine format.

use std::io::{self, Write};

use rustc_hash::FxHashMap;

use crate::instr::{ConstOp, Instr, JumpOp, NiladicOp, Shape, UnOp};
use crate::unit::Unit;

/// Renders a [`Unit`] as one mnemonic line per instruction.
///
/// Jump targets are assigned labels (`L0`, `L1`, ...) lazily on first
/// reference, so every instruction that branches to the same offset names
/// the same label.
pub struct UnitDisassembler<'a> {
    unit: &'a Unit,
    labels: FxHashMap<usize, String>,
}

impl<'a> UnitDisassembler<'a> {
    /// Create a disassembler over a unit
    pub fn new(unit: &'a Unit) -> Self {
        Self {
            unit,
            labels: FxHashMap::default(),
        }
    }

    /// Label at an offset, assigning a fresh one on first reference
    pub fn label(&mut self, offset: usize) -> String {
        if let Some(lbl) = self.labels.get(&offset) {
            return lbl.clone();
        }
        let lbl = format!("L{}", self.labels.len());
        self.labels.insert(offset, lbl.clone());
        lbl
    }

    fn short_k(&self, kidx: u32) -> String {
        match self.unit.constants().get(kidx as usize) {
            Some(k) => k.short_string(),
            None => "?".to_string(),
        }
    }

    /// Render one instruction at `offset`
    pub fn render(&mut self, instr: Instr, offset: usize) -> String {
        match instr.shape() {
            Shape::Receive => {
                if instr.f() {
                    format!("recv ...{}", instr.a())
                } else {
                    format!("recv {}", instr.a())
                }
            }
            Shape::Binary => format!(
                "{} {} {} {}",
                instr.bin_op().name(),
                instr.a(),
                instr.b(),
                instr.c()
            ),
            Shape::Index => {
                if instr.f() {
                    format!("settab {} {} {}", instr.b(), instr.c(), instr.a())
                } else {
                    format!("gettab {} {} {}", instr.a(), instr.b(), instr.c())
                }
            }
            Shape::Constant => {
                let op = match instr.const_op() {
                    ConstOp::Load => "k",
                    ConstOp::Closure => "clos",
                };
                let body = format!("k{} ; {}", instr.kidx(), self.short_k(instr.kidx()));
                if instr.f() {
                    format!("push {} {} {}", instr.a(), op, body)
                } else {
                    format!("{} {} {}", op, instr.a(), body)
                }
            }
            Shape::Unary => self.render_unary(instr),
            Shape::Transfer => self.render_transfer(instr, offset),
        }
    }

    fn render_unary(&mut self, instr: Instr) -> String {
        if instr.is_niladic() {
            let name = match instr.niladic_op() {
                Some(NiladicOp::Table) => "table",
                Some(NiladicOp::CurrentCont) => "cc",
                None => "??",
            };
            if instr.f() {
                format!("push {} {}", instr.a(), name)
            } else {
                format!("{} {}", name, instr.a())
            }
        } else {
            match instr.un_op() {
                Some(UnOp::Id) if instr.f() => format!("push {} {}", instr.a(), instr.b()),
                Some(op) => format!("{} {} {}", op.name(), instr.a(), instr.b()),
                None => "??".to_string(),
            }
        }
    }

    fn render_transfer(&mut self, instr: Instr, offset: usize) -> String {
        match instr.jump_op() {
            Some(JumpOp::Jump) => {
                let target = offset.wrapping_add_signed(instr.n() as isize);
                format!("jmp {}", self.label(target))
            }
            Some(JumpOp::JumpIf) => {
                let target = offset.wrapping_add_signed(instr.n() as isize);
                let op = if instr.f() { "jif" } else { "jifnot" };
                format!("{} {} {}", op, instr.a(), self.label(target))
            }
            Some(JumpOp::Call) => format!("call {}", instr.a()),
            None => "??".to_string(),
        }
    }

    /// Write the full listing: `label \t index \t word \t mnemonic`
    pub fn disassemble(&mut self, w: &mut impl Write) -> io::Result<()> {
        let code = self.unit.code().to_vec();
        let lines: Vec<String> = code
            .iter()
            .enumerate()
            .map(|(i, &instr)| self.render(instr, i))
            .collect();
        for (i, line) in lines.iter().enumerate() {
            let lbl = self.labels.get(&i).map(String::as_str).unwrap_or("");
            writeln!(w, "{}\t{}\t{:08x}\t{}", lbl, i, code[i].word(), line)?;
        }
        Ok(())
    }

    /// The full listing as a string
    pub fn to_listing(&mut self) -> String {
        let mut buf = Vec::new();
        self.disassemble(&mut buf).expect("write to Vec cannot fail");
        String::from_utf8(buf).expect("listing is valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;
    use crate::instr::BinOp;
    use crate::reg::Reg;

    fn sample_unit() -> Unit {
        let r0 = Reg::local(0);
        let r1 = Reg::local(1);
        let code = vec![
            Instr::load_const(r0, 0).unwrap(),
            Instr::jump_if(r0, 3, false).unwrap(),
            Instr::bin(BinOp::Add, r1, r0, r0).unwrap(),
            Instr::jump(-2).unwrap(),
            Instr::recv(r1).unwrap(),
        ];
        Unit::new(code, vec![Constant::Int(7)])
    }

    #[test]
    fn test_one_line_per_instruction() {
        let unit = sample_unit();
        let mut dis = UnitDisassembler::new(&unit);
        let listing = dis.to_listing();
        assert_eq!(listing.lines().count(), unit.code().len());
    }

    #[test]
    fn test_labels_are_consistent() {
        let unit = sample_unit();
        let mut dis = UnitDisassembler::new(&unit);
        let listing = dis.to_listing();
        let lines: Vec<&str> = listing.lines().collect();

        // jump_if at 1 targets offset 4; jump at 3 targets offset 1.
        assert!(lines[1].contains("jifnot r0 L0"));
        assert!(lines[4].starts_with("L0\t"));
        assert!(lines[3].contains("jmp L1"));
        assert!(lines[1].starts_with("L1\t"));
    }

    #[test]
    fn test_constant_rendering() {
        let unit = sample_unit();
        let mut dis = UnitDisassembler::new(&unit);
        let listing = dis.to_listing();
        assert!(listing.lines().next().unwrap().contains("k r0 k0 ; 7"));
    }
}
