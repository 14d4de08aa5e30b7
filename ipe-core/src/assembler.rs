//! Assembler com rótulos de referência adiantada
//!
//! O gerador emite instruções em vários `Assembler` independentes (um por
//! operando, corpo de função ou unidade) e depois os emenda (`splice`) em um
//! único buffer. Rótulos vivem numa arena (`LabelTable`) por sessão de
//! compilação e são endereçados por handle, sem ponteiros de volta.
//!
//! ```text
//!   LC32 <deslocamento>   ← sítio de referência (imediato de 4 bytes)
//!   JMP | JT | JF | CALL  ← consome o deslocamento
//! ```
//!
//! O deslocamento gravado é `alvo − sítio + 1`, ou seja, relativo ao início
//! da sequência `LC32`, que é onde a máquina soma o deslocamento.

use std::fmt;

use crate::error::AsmError;
use crate::opcode::Opcode;

/// Handle de rótulo na arena da sessão
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Identidade de um buffer de assembler dentro da sessão
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmId(u32);

/// Posição (buffer, offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Site {
    asm: AsmId,
    offset: u32,
}

/// Estado de um rótulo: `bound == None` é Unbound
#[derive(Debug, Default)]
struct LabelSlot {
    bound: Option<Site>,
    pending: Vec<Site>,
}

/// Arena de rótulos e sítios pendentes de uma sessão
#[derive(Debug, Default)]
pub struct LabelTable {
    slots: Vec<LabelSlot>,
    next_asm: u32,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria um rótulo ainda não ligado
    pub fn create(&mut self) -> Label {
        let label = Label(self.slots.len() as u32);
        self.slots.push(LabelSlot::default());
        label
    }

    /// Cria um assembler vazio com identidade única nesta sessão
    pub fn assembler(&mut self) -> Assembler {
        let id = AsmId(self.next_asm);
        self.next_asm += 1;
        Assembler {
            id,
            code: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn is_bound(&self, label: Label) -> bool {
        self.slot(label).is_some_and(|s| s.bound.is_some())
    }

    /// Endereço ligado (buffer, offset)
    pub fn address(&self, label: Label) -> Option<(AsmId, u32)> {
        self.slot(label)
            .and_then(|s| s.bound)
            .map(|site| (site.asm, site.offset))
    }

    /// Referências ainda não corrigidas
    pub fn pending_count(&self, label: Label) -> usize {
        self.slot(label).map_or(0, |s| s.pending.len())
    }

    /// Rótulos com referências pendentes
    pub fn unresolved(&self) -> Vec<Label> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.pending.is_empty())
            .map(|(i, _)| Label(i as u32))
            .collect()
    }

    /// Falha se algum rótulo ficou com referência sem destino
    pub fn ensure_resolved(&self) -> Result<(), AsmError> {
        match self.unresolved().first() {
            Some(&label) => Err(AsmError::UnresolvedLabel(label)),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, label: Label) -> Option<&LabelSlot> {
        self.slots.get(label.index())
    }
}

/// Grava `alvo − sítio + 1` no imediato de 32 bits em `site`
fn patch(code: &mut [u8], site: u32, target: u32) {
    let displacement = (target as i64 - site as i64 + 1) as i32;
    let at = site as usize;
    code[at..at + 4].copy_from_slice(&displacement.to_le_bytes());
}

/// Buffer de bytecode com a lista de rótulos que ele toca
#[derive(Debug)]
pub struct Assembler {
    id: AsmId,
    code: Vec<u8>,
    /// Rótulos ligados ou referenciados aqui (posse transferida no splice)
    labels: Vec<Label>,
}

impl Assembler {
    pub fn id(&self) -> AsmId {
        self.id
    }

    /// Posição atual de escrita
    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    // ═══════════════════════════════════════════════════════════════
    // EMISSÃO
    // ═══════════════════════════════════════════════════════════════

    pub fn op(&mut self, op: Opcode) {
        debug_assert_eq!(op.operand().size(), 0, "{} takes an operand", op);
        self.code.push(op as u8);
    }

    pub fn op_u8(&mut self, op: Opcode, value: u8) {
        self.code.push(op as u8);
        self.code.push(value);
    }

    pub fn op_i16(&mut self, op: Opcode, value: i16) {
        self.code.push(op as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn op_u16(&mut self, op: Opcode, value: u16) {
        self.code.push(op as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn op_i32(&mut self, op: Opcode, value: i32) {
        self.code.push(op as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn op_u32(&mut self, op: Opcode, value: u32) {
        self.code.push(op as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    pub fn op_i64(&mut self, op: Opcode, value: i64) {
        self.code.push(op as u8);
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Bytes crus (segmento de dados)
    pub fn raw(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    // ═══════════════════════════════════════════════════════════════
    // RÓTULOS
    // ═══════════════════════════════════════════════════════════════

    /// Liga o rótulo à posição atual e corrige as referências deste buffer
    pub fn bind(&mut self, labels: &mut LabelTable, label: Label) -> Result<(), AsmError> {
        let target = self.position();
        let id = self.id;
        let slot = &mut labels.slots[label.index()];
        if slot.bound.is_some() {
            return Err(AsmError::LabelAlreadyBound(label));
        }
        slot.bound = Some(Site { asm: id, offset: target });

        let code = &mut self.code;
        slot.pending.retain(|site| {
            if site.asm == id {
                patch(code, site.offset, target);
                false
            } else {
                true
            }
        });
        self.touch(label);
        Ok(())
    }

    /// Emite `LC32 <deslocamento>; op` apontando para `label`
    pub fn emit_jump(&mut self, labels: &mut LabelTable, op: Opcode, label: Label) {
        debug_assert!(op.is_transfer(), "{} is not a transfer", op);
        self.op_i32(Opcode::Lc32, 0);
        let site = self.position() - 4;
        self.op(op);

        let id = self.id;
        let slot = &mut labels.slots[label.index()];
        match slot.bound {
            Some(bound) if bound.asm == id => patch(&mut self.code, site, bound.offset),
            _ => slot.pending.push(Site { asm: id, offset: site }),
        }
        self.touch(label);
    }

    /// Anexa `other` ao fim deste buffer, rebaseando seus rótulos
    pub fn splice(&mut self, labels: &mut LabelTable, other: Assembler) {
        let base = self.position();
        let id = self.id;
        self.code.extend_from_slice(&other.code);

        for label in other.labels {
            let slot = &mut labels.slots[label.index()];
            if let Some(bound) = slot.bound.as_mut() {
                if bound.asm == other.id {
                    bound.asm = id;
                    bound.offset += base;
                }
            }
            for site in slot.pending.iter_mut().filter(|s| s.asm == other.id) {
                site.asm = id;
                site.offset += base;
            }
            if let Some(bound) = slot.bound.filter(|b| b.asm == id) {
                let code = &mut self.code;
                slot.pending.retain(|site| {
                    if site.asm == id {
                        patch(code, site.offset, bound.offset);
                        false
                    } else {
                        true
                    }
                });
            }
            self.touch(label);
        }
    }

    fn touch(&mut self, label: Label) {
        if self.labels.last() != Some(&label) {
            self.labels.push(label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displacement_at(code: &[u8], site: u32) -> i32 {
        let at = site as usize;
        i32::from_le_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
    }

    #[test]
    fn test_forward_reference_patched_on_bind() {
        let mut labels = LabelTable::new();
        let mut asm = labels.assembler();
        let end = labels.create();

        asm.emit_jump(&mut labels, Opcode::Jmp, end);
        assert_eq!(labels.pending_count(end), 1);
        asm.op(Opcode::Nop);
        asm.bind(&mut labels, end).unwrap();
        assert_eq!(labels.pending_count(end), 0);

        // LC32 em 0, sítio em 1, alvo em 7
        assert_eq!(displacement_at(asm.bytes(), 1), 7);
    }

    #[test]
    fn test_backward_reference_patched_immediately() {
        let mut labels = LabelTable::new();
        let mut asm = labels.assembler();
        let top = labels.create();

        asm.op(Opcode::Nop);
        asm.bind(&mut labels, top).unwrap();
        asm.op(Opcode::Nop);
        asm.emit_jump(&mut labels, Opcode::Jmp, top);

        assert_eq!(labels.pending_count(top), 0);
        let site = 3;
        let disp = displacement_at(asm.bytes(), site);
        assert_eq!(disp as i64 + site as i64 - 1, 1);
    }

    #[test]
    fn test_double_bind_is_rejected() {
        let mut labels = LabelTable::new();
        let mut asm = labels.assembler();
        let l = labels.create();
        asm.bind(&mut labels, l).unwrap();
        assert_eq!(asm.bind(&mut labels, l), Err(AsmError::LabelAlreadyBound(l)));
    }

    #[test]
    fn test_splice_rebases_bound_and_pending() {
        let mut labels = LabelTable::new();
        let mut outer = labels.assembler();
        let mut inner = labels.assembler();
        let inner_top = labels.create();
        let outer_end = labels.create();

        outer.op(Opcode::Nop);
        outer.op(Opcode::Nop);

        inner.bind(&mut labels, inner_top).unwrap();
        inner.op(Opcode::Nop);
        inner.emit_jump(&mut labels, Opcode::Jmp, inner_top);
        inner.emit_jump(&mut labels, Opcode::Jmp, outer_end);
        let inner_id = inner.id();

        outer.splice(&mut labels, inner);
        assert_eq!(labels.address(inner_top), Some((outer.id(), 2)));
        assert_ne!(outer.id(), inner_id);

        outer.bind(&mut labels, outer_end).unwrap();
        assert!(labels.unresolved().is_empty());

        // segundo salto: sítio em 2 + 7 + 1 = 10, alvo no fim
        let end = outer.position();
        let disp = displacement_at(outer.bytes(), 10);
        assert_eq!(disp as i64 + 10 - 1, end as i64);
    }

    #[test]
    fn test_cross_assembler_reference_resolved_after_both_spliced() {
        let mut labels = LabelTable::new();
        let mut program = labels.assembler();
        let mut caller = labels.assembler();
        let mut callee = labels.assembler();
        let entry = labels.create();

        caller.emit_jump(&mut labels, Opcode::Call, entry);
        caller.op(Opcode::Halt);
        callee.bind(&mut labels, entry).unwrap();
        callee.op(Opcode::Ret);

        // ligado em outro buffer: ainda pendente
        assert_eq!(labels.pending_count(entry), 1);

        program.splice(&mut labels, caller);
        assert_eq!(labels.pending_count(entry), 1);
        program.splice(&mut labels, callee);
        assert_eq!(labels.pending_count(entry), 0);
        assert!(labels.ensure_resolved().is_ok());

        assert_eq!(labels.address(entry), Some((program.id(), 7)));
        assert_eq!(displacement_at(program.bytes(), 1), 7);
    }

    #[test]
    fn test_unresolved_reported() {
        let mut labels = LabelTable::new();
        let mut asm = labels.assembler();
        let l = labels.create();
        asm.emit_jump(&mut labels, Opcode::Jf, l);
        assert_eq!(labels.ensure_resolved(), Err(AsmError::UnresolvedLabel(l)));
    }
}
