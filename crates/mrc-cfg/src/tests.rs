//! Pipeline tests over fabricated binaries: the idiom scenarios, CFG laws
//! and signature inference.

use mrc_isa::{Gpr, Op};

use crate::{Analysis, AnalysisError, AnalysisOptions};

pub mod fixtures {
    use mrc_elf::{Binary, Section};

    pub const TEXT_VADDR: u32 = 0x0040_0000;

    pub fn be_bytes(words: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(words.len() * 4);
        for &w in words {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out
    }

    pub fn section(vaddr: u32, words: &[u32]) -> Section {
        Section {
            vaddr,
            data: be_bytes(words),
        }
    }

    pub fn binary_with_text(words: &[u32]) -> Binary {
        Binary {
            text_vaddr: TEXT_VADDR,
            text: be_bytes(words),
            ..Binary::default()
        }
    }
}

use fixtures::{binary_with_text, section, TEXT_VADDR};

fn analyzed(words: &[u32]) -> Analysis {
    let mut binary = binary_with_text(words);
    binary.main_addr = TEXT_VADDR;
    binary.text_functions.push(TEXT_VADDR);
    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.run().unwrap();
    analysis
}

fn rewritten(words: &[u32]) -> Analysis {
    let binary = binary_with_text(words);
    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();
    analysis
}

/// Every (u, v) successor edge must have a matching predecessor edge.
fn assert_edge_symmetry(analysis: &Analysis) {
    for (u, insn) in analysis.insns.iter().enumerate() {
        for e in &insn.successors {
            assert!(
                analysis.insns[e.i].predecessors.iter().any(|p| p.i == u),
                "no predecessor mirror for edge {} -> {}",
                u,
                e.i
            );
        }
        for p in &insn.predecessors {
            assert!(
                analysis.insns[p.i].successors.iter().any(|s| s.i == u),
                "no successor mirror for edge {} -> {}",
                p.i,
                u
            );
        }
    }
}

#[test]
fn test_hi_lo_fusion() {
    let analysis = rewritten(&[
        0x3c08_0040, // lui $t0, 0x40
        0x2508_1234, // addiu $t0, $t0, 0x1234
        0x03e0_0008, // jr $ra
        0x0000_0000,
    ]);

    let hi = &analysis.insns[0];
    assert_eq!(hi.op(), Op::Li);
    assert!(hi.patched);
    assert_eq!(hi.patched_addr, 0x0040_1234);
    assert_eq!(hi.linked_insn, Some(1));

    let lo = &analysis.insns[1];
    assert_eq!(lo.op(), Op::Move);
    assert_eq!(lo.instr.rd, Gpr::T0);
    assert_eq!(lo.linked_insn, Some(0));
    assert_eq!(lo.linked_value, 0x0040_1234);
}

#[test]
fn test_hi_lo_fusion_store() {
    let analysis = rewritten(&[
        0x3c08_0041, // lui $t0, 0x41
        0xad04_0010, // sw $a0, 0x10($t0)
    ]);

    assert_eq!(analysis.insns[0].op(), Op::Li);
    assert_eq!(analysis.insns[0].patched_addr, 0x0041_0010);
    let user = &analysis.insns[1];
    assert_eq!(user.op(), Op::Sw);
    assert!(user.patched);
    assert_eq!(user.mem_offset(), 0);
}

#[test]
fn test_hi_lo_search_stops_at_redefinition() {
    let analysis = rewritten(&[
        0x3c08_0040, // lui $t0, 0x40
        0x8d08_0000, // lw $t0, 0($t0) -- redefines $t0
        0x2508_1234, // addiu $t0, $t0, 0x1234
    ]);

    // The lw both uses and redefines $t0: the addiu must not fuse with the
    // lui, but the lw itself (as a user) does.
    assert_eq!(analysis.insns[2].op(), Op::Addiu);
    assert!(!analysis.insns[2].patched);
}

#[test]
fn test_global_got_memop() {
    let mut binary = binary_with_text(&[
        0x8f88_800c, // lw $t0, -0x7ff4($gp)
        0x0000_0000,
    ]);
    binary.gp_value = 0x1001_0000;
    binary.gp_value_adj = 0x8008;
    binary.got_locals = vec![0, 0];
    binary.got_globals = vec![0, 0, 0, 0x0040_2000];

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();

    let insn = &analysis.insns[0];
    assert_eq!(insn.op(), Op::Li);
    assert!(insn.patched);
    assert!(insn.is_global_got_memop);
    assert_eq!(insn.patched_addr, 0x0040_2000);
    assert_eq!(insn.linked_value, 0x0040_2000);
}

#[test]
fn test_jalr_t9_resolution() {
    let mut words = vec![0u32; 0x10a8 / 4];
    words[0] = 0x8f99_0008; // lw $t9, 8($gp)
    words[1] = 0x0320_f809; // jalr $t9
    words[0x10a0 / 4] = 0x03e0_0008; // jr $ra at the callee

    let mut binary = binary_with_text(&words);
    binary.gp_value_adj = 0;
    binary.got_locals = vec![0, 0];
    binary.got_globals = vec![0x0040_10a0];

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();

    assert_eq!(analysis.insns[0].op(), Op::Nop);
    assert!(analysis.insns[0].patched);
    let call = &analysis.insns[1];
    assert_eq!(call.op(), Op::Jal);
    assert_eq!(call.patched_addr, 0x0040_10a0);
    assert!(analysis.functions.contains_key(&0x0040_10a0));
    assert!(analysis.label_addresses.contains(&0x0040_10a0));
}

#[test]
fn test_jump_table_five_cases() {
    let targets = [
        TEXT_VADDR,
        TEXT_VADDR + 4,
        TEXT_VADDR + 8,
        TEXT_VADDR + 12,
        TEXT_VADDR + 16,
    ];
    let mut binary = binary_with_text(&[
        0x2c41_0005, // sltiu $at, $v0, 5
        0x1020_0006, // beqz $at, default
        0x0000_0000,
        0x3c01_0041, // lui $at, %hi(jtbl)
        0x0002_1880, // sll $v1, $v0, 2
        0x0023_0821, // addu $at, $at, $v1
        0x8c23_0000, // lw $v1, %lo(jtbl)($at)
        0x0060_0008, // jr $v1
        0x0000_0000,
    ]);
    binary.rodata = Some(section(0x0041_0000, &targets));

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();

    let jr = &analysis.insns[7];
    assert_eq!(jr.jtbl_addr, 0x0041_0000);
    assert_eq!(jr.num_cases, 5);
    assert_eq!(jr.index_reg, Gpr::V0);
    for i in 3..=6 {
        assert_eq!(analysis.insns[i].op(), Op::Nop, "insn {i} not noped");
    }
    // The bounding sltiu feeds the default-case beqz and stays.
    assert_eq!(analysis.insns[0].op(), Op::Sltiu);
    for t in targets {
        assert!(analysis.label_addresses.contains(&t));
    }
}

#[test]
fn test_jump_table_outside_rodata() {
    let mut binary = binary_with_text(&[
        0x2c41_0005, // sltiu $at, $v0, 5
        0x1020_0006, // beqz $at, default
        0x0000_0000,
        0x3c01_0041, // lui $at, %hi(jtbl)
        0x0002_1880, // sll $v1, $v0, 2
        0x0023_0821, // addu $at, $at, $v1
        0x8c23_0000, // lw $v1, %lo(jtbl)($at)
        0x0060_0008, // jr $v1
        0x0000_0000,
    ]);
    // Three words cannot hold five cases.
    binary.rodata = Some(section(0x0041_0000, &[0, 0, 0]));

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    let err = analysis.rewrite_idioms().unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::JumpTableOutOfRodata { addr: 0x0041_0000 }
    ));
}

#[test]
fn test_bgezal_zero_becomes_jal() {
    let analysis = rewritten(&[
        0x0411_0001, // bgezal $zero, +4
        0x0000_0000,
        0x0000_0000,
    ]);
    let insn = &analysis.insns[0];
    assert_eq!(insn.op(), Op::Jal);
    assert_eq!(insn.patched_addr, TEXT_VADDR + 8);
    assert!(analysis.functions.contains_key(&(TEXT_VADDR + 8)));
    assert!(analysis.label_addresses.contains(&(TEXT_VADDR + 8)));
}

#[test]
fn test_gp_preamble_noped() {
    let analysis = rewritten(&[
        0x3c1c_0fb9, // lui $gp, 0xfb9
        0x279c_366c, // addiu $gp, $gp, 13932
        0x0399_e021, // addu $gp, $gp, $t9
        0x0000_0000,
    ]);
    for i in 0..=2 {
        assert_eq!(analysis.insns[i].op(), Op::Nop);
        assert!(analysis.insns[i].patched);
    }
}

#[test]
fn test_float_li() {
    let analysis = rewritten(&[
        0x3c08_4048, // lui $t0, 0x4048 (3.14...f upper half)
        0x4488_6000, // mtc1 $t0, $f12
    ]);
    let insn = &analysis.insns[0];
    assert_eq!(insn.op(), Op::Li);
    assert_eq!(insn.patched_addr, 0x4048_0000);
    assert_eq!(insn.linked_insn, Some(1));
}

#[test]
fn test_returns_and_end_addrs() {
    let mut binary = binary_with_text(&[
        0x03e0_0008, // main: jr $ra
        0x0000_0000,
        0x03e0_0008, // second: jr $ra
        0x0000_0000,
    ]);
    binary.main_addr = TEXT_VADDR;
    binary.text_functions = vec![TEXT_VADDR, TEXT_VADDR + 8];

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();
    analysis.finalize_functions().unwrap();

    let main = &analysis.functions[&TEXT_VADDR];
    assert_eq!(main.returns, vec![TEXT_VADDR + 4]);
    assert_eq!(main.end_addr, TEXT_VADDR + 8);
    let second = &analysis.functions[&(TEXT_VADDR + 8)];
    assert_eq!(second.returns, vec![TEXT_VADDR + 12]);
    assert_eq!(second.end_addr, TEXT_VADDR + 16);
}

#[test]
fn test_function_without_return_is_fatal() {
    let mut binary = binary_with_text(&[0x0000_0000, 0x0000_0000]);
    binary.text_functions = vec![TEXT_VADDR];

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.disassemble();
    analysis.rewrite_idioms().unwrap();
    let err = analysis.finalize_functions().unwrap_err();
    assert!(matches!(err, AnalysisError::MissingReturn { addr: TEXT_VADDR }));
}

#[test]
fn test_branch_delay_slot_edges() {
    let analysis = analyzed(&[
        0x1440_0002, // bnez $v0, +8 (to the jr)
        0x0000_0000,
        0x0000_0000,
        0x03e0_0008, // jr $ra
        0x0000_0000,
    ]);

    // Delay-slot law: the slot is flagged and carries the branch's target
    // edge.
    assert!(analysis.insns[1].no_following_successor);
    let succ1: Vec<usize> = analysis.insns[1].successors.iter().map(|e| e.i).collect();
    assert_eq!(succ1, vec![3, 2]);
    let succ0: Vec<usize> = analysis.insns[0].successors.iter().map(|e| e.i).collect();
    assert_eq!(succ0, vec![1]);

    // Branch target must be in the label set (label closure).
    assert!(analysis.label_addresses.contains(&(TEXT_VADDR + 12)));

    assert_edge_symmetry(&analysis);

    // Every non-terminal instruction has a successor.
    for (i, insn) in analysis.insns.iter().enumerate() {
        if !insn.no_following_successor && i + 1 < analysis.insns.len() {
            assert!(!insn.successors.is_empty(), "no successors at {i}");
        }
    }
}

#[test]
fn test_call_edges_and_returns() {
    let analysis = analyzed(&[
        0x0c10_0004, // jal 0x400010
        0x0000_0000,
        0x03e0_0008, // jr $ra
        0x0000_0000,
        0x03e0_0008, // callee: jr $ra
        0x0000_0000,
    ]);

    // Entry edge from the delay slot, tagged.
    assert!(analysis.insns[1]
        .successors
        .iter()
        .any(|e| e.i == 4 && e.function_entry));
    // Exit edge from the callee's return slot to the resume slot.
    assert!(analysis.insns[5]
        .successors
        .iter()
        .any(|e| e.i == 2 && e.function_exit));
    assert!(analysis.insns[1].no_following_successor);
    assert_edge_symmetry(&analysis);
}

#[test]
fn test_signature_two_args_one_ret() {
    let analysis = analyzed(&[
        0x0085_1024, // and $v0, $a0, $a1
        0x03e0_0008, // jr $ra
        0x0000_0000,
    ]);

    let main = &analysis.functions[&TEXT_VADDR];
    assert_eq!(main.nargs, 2);
    assert_eq!(main.nret, 1);
    assert!(!main.v0_in);
}

#[test]
fn test_signature_pointer_callee_two_rets() {
    let mut binary = binary_with_text(&[
        0x03e0_0008, // main: jr $ra
        0x0000_0000,
        0x0080_1021, // f: move $v0, $a0
        0x00a0_1821, // move $v1, $a1
        0x03e0_0008, // jr $ra
        0x0000_0000,
    ]);
    binary.main_addr = TEXT_VADDR;
    binary.text_functions = vec![TEXT_VADDR];
    binary.data = Some(section(0x0041_0000, &[TEXT_VADDR + 8]));

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.run().unwrap();

    let f = &analysis.functions[&(TEXT_VADDR + 8)];
    assert!(f.referenced_by_function_pointer);
    assert_eq!(f.nret, 2);
    assert_eq!(f.nargs, 2);
    assert!(!f.v0_in);

    // Bounds hold for every function.
    for f in analysis.functions.values() {
        assert!(f.nargs <= 4);
        assert!(f.nret <= 2);
    }
}

#[test]
fn test_forward_liveness_prunes_dead_defs() {
    // $t1 is never live at entry, so the add off it must not mark $t2 live.
    let analysis = analyzed(&[
        0x0121_5021, // addu $t2, $t1, $at
        0x03e0_0008, // jr $ra
        0x0000_0000,
    ]);
    let insn = &analysis.insns[0];
    assert!(insn.f_livein.contains(Gpr::A0));
    assert!(!insn.f_liveout.contains(Gpr::T2));

    // At fixpoint, plain edges propagate the whole live-out mask.
    for insn in &analysis.insns {
        for e in &insn.successors {
            if !e.function_entry && !e.function_exit && !e.extern_function && !e.function_pointer
            {
                assert!(analysis.insns[e.i].f_livein.contains_all(insn.f_liveout));
            }
        }
    }
}

#[test]
fn test_jump_table_liveness_reads_index() {
    let targets = [TEXT_VADDR + 36, TEXT_VADDR + 36, TEXT_VADDR + 36];
    let mut words = vec![
        0x2c41_0003, // sltiu $at, $v0, 3
        0x1020_0006, // beqz $at, default
        0x0000_0000,
        0x3c01_0041, // lui $at, %hi(jtbl)
        0x0002_1880, // sll $v1, $v0, 2
        0x0023_0821, // addu $at, $at, $v1
        0x8c23_0000, // lw $v1, %lo(jtbl)($at)
        0x0060_0008, // jr $v1
        0x0000_0000,
    ];
    words.push(0x03e0_0008); // shared case target: jr $ra
    words.push(0x0000_0000);
    let mut binary = binary_with_text(&words);
    binary.main_addr = TEXT_VADDR;
    binary.text_functions = vec![TEXT_VADDR];
    binary.rodata = Some(section(0x0041_0000, &targets));

    let mut analysis = Analysis::new(binary, AnalysisOptions::clean());
    analysis.run().unwrap();

    // The realizing jr consumes the recovered index register.
    assert!(analysis.insns[7].b_livein.contains(Gpr::V0));
    assert_edge_symmetry(&analysis);
}
