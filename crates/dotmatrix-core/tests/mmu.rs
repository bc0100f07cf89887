mod common;

use std::sync::{Arc, Mutex};

use common::{PROGRAM_START, RomBuilder, gameboy_with, run_until_pc};
use dotmatrix_core::audio::{AudioSink, Channel};
use dotmatrix_core::clock::ClockSubscriber;
use dotmatrix_core::gameboy::{GameBoy, RunOutcome};
use dotmatrix_core::hardware::Model;
use dotmatrix_core::interrupts::{Interrupt, InterruptController};
use dotmatrix_core::joypad::Button;
use dotmatrix_core::memory::Region;
use dotmatrix_core::ppu::FRAME_CYCLES;

#[test]
fn address_map_routes_by_region() {
    let mut gb = GameBoy::new(Model::Dmg);
    assert_eq!(Region::of(0x8500), Region::Vram);
    gb.mmu.write(0x8500, 0x3C);
    assert_eq!(gb.mmu.ppu().read_vram(0x8500), 0x3C);

    gb.mmu.write(0xFF40, 0xE3);
    assert_eq!(gb.mmu.read(0xFF40), 0xE3);
    // LY is read-only
    let ly = gb.mmu.read(0xFF44);
    gb.mmu.write(0xFF44, ly.wrapping_add(7));
    assert_eq!(gb.mmu.read(0xFF44), ly);

    gb.mmu.write(0xFF80, 0x11);
    gb.mmu.write(0xFFFE, 0x22);
    assert_eq!((gb.mmu.read(0xFF80), gb.mmu.read(0xFFFE)), (0x11, 0x22));
    gb.mmu.write(0xFEA0, 0x33);
    assert_eq!(gb.mmu.read(0xFEA0), 0xFF);
}

#[test]
fn vram_banks_switch_only_on_cgb() {
    let mut gb = GameBoy::new(Model::Cgb);
    gb.mmu.write(0xFF4F, 0x01);
    gb.mmu.write(0x8000, 0xAA);
    assert_eq!(gb.mmu.read(0xFF4F), 0xFF);
    gb.mmu.write(0xFF4F, 0x00);
    assert_eq!(gb.mmu.read(0xFF4F), 0xFE);
    assert_eq!(gb.mmu.read(0x8000), 0x00);

    let mut dmg = GameBoy::new(Model::Dmg);
    dmg.mmu.write(0xFF4F, 0x01);
    dmg.mmu.write(0x8000, 0xAA);
    dmg.mmu.write(0xFF4F, 0x00);
    assert_eq!(dmg.mmu.read(0x8000), 0xAA);
    assert_eq!(dmg.mmu.read(0xFF4F), 0xFF);
}

#[test]
fn stop_after_key1_doubles_the_cpu_clock() {
    let program = [
        0x3E, 0x01, // LD A,01
        0xE0, 0x4D, // LDH (KEY1),A
        0x10, 0x00, // STOP
        0x18, 0xFE, // JR -2
    ];
    let mut gb = GameBoy::new(Model::Cgb);
    gb.load_cartridge(RomBuilder::new(&program).cgb().cartridge());
    run_until_pc(&mut gb, PROGRAM_START + 6, 8);
    assert!(gb.mmu.double_speed());
    assert_eq!(gb.mmu.read(0xFF4D), 0xFE);

    assert_eq!(gb.run_frame().unwrap(), RunOutcome::FrameComplete);
    let start = gb.cpu.cycles;
    assert_eq!(gb.run_frame().unwrap(), RunOutcome::FrameComplete);
    let elapsed = gb.cpu.cycles - start;
    assert!(elapsed.abs_diff(2 * u64::from(FRAME_CYCLES)) < 24, "{elapsed}");
}

#[test]
fn stop_waits_for_a_button_on_dmg() {
    // STOP ; INC A ; JR -2
    let mut gb = gameboy_with(Model::Dmg, &[0x10, 0x00, 0x3C, 0x18, 0xFE]);
    assert_eq!(gb.run_frame().unwrap(), RunOutcome::Stopped);
    let cycles = gb.cpu.cycles;
    assert_eq!(gb.run_frame().unwrap(), RunOutcome::Stopped);
    assert_eq!(gb.cpu.cycles, cycles);

    gb.press(Button::Start);
    gb.step().unwrap();
    assert!(!gb.cpu.stopped);
    assert_eq!(gb.cpu.regs.pc, PROGRAM_START + 3);
}

#[test]
fn selected_button_press_requests_joypad_interrupt() {
    let mut gb = GameBoy::new(Model::Dmg);
    gb.mmu.write(0xFF0F, 0x00);
    // select the action buttons
    gb.mmu.write(0xFF00, 0x10);
    gb.press(Button::Right);
    assert!(!gb.mmu.interrupts().is_requested(Interrupt::Joypad));
    gb.press(Button::A);
    assert!(gb.mmu.interrupts().is_requested(Interrupt::Joypad));
    assert_eq!(gb.mmu.read(0xFF00) & 0x0F, 0x0E);
    gb.release(Button::A);
    assert_eq!(gb.mmu.read(0xFF00) & 0x0F, 0x0F);
}

#[test]
fn timer_counts_through_the_bus() {
    let mut gb = GameBoy::new(Model::Dmg);
    gb.mmu.write(0xFF04, 0x00);
    gb.mmu.write(0xFF05, 0x00);
    // enabled, 262144 Hz
    gb.mmu.write(0xFF07, 0x05);
    gb.mmu.tick(16 * 10);
    assert_eq!(gb.mmu.read(0xFF05), 10);
    assert_eq!(gb.mmu.read(0xFF07), 0xFD);
}

#[derive(Default)]
struct Recorder {
    triggers: Vec<Channel>,
    cycles: u64,
}

#[derive(Clone, Default)]
struct SharedRecorder(Arc<Mutex<Recorder>>);

impl ClockSubscriber for SharedRecorder {
    fn update_clock(&mut self, cycles: u32, _irq: &mut InterruptController) {
        self.0.lock().unwrap().cycles += u64::from(cycles);
    }
}

impl AudioSink for SharedRecorder {
    fn trigger(&mut self, channel: Channel) {
        self.0.lock().unwrap().triggers.push(channel);
    }
}

#[test]
fn audio_sink_hears_triggers_and_cycles() {
    let mut gb = GameBoy::new(Model::Dmg);
    let recorder = SharedRecorder::default();
    gb.mmu.attach_audio(Box::new(recorder.clone()));
    gb.mmu.write(0xFF14, 0x80);
    gb.mmu.write(0xFF23, 0x40);
    gb.mmu.write(0xFF1E, 0xC0);
    gb.mmu.tick(100);

    let state = recorder.0.lock().unwrap();
    assert_eq!(state.triggers, vec![Channel::Pulse1, Channel::Wave]);
    assert_eq!(state.cycles, 100);
}

#[test]
fn oam_dma_from_a_program() {
    let program = [
        0x3E, 0xC0, // LD A,C0
        0xE0, 0x46, // LDH (DMA),A
        0x18, 0xFE, // JR -2
    ];
    let mut gb = gameboy_with(Model::Dmg, &program);
    for i in 0..0xA0u16 {
        gb.mmu.write(0xC000 + i, 0xFF - i as u8);
    }
    run_until_pc(&mut gb, PROGRAM_START + 4, 8);
    assert_eq!(gb.mmu.read(0xFE00), 0xFF);
    assert_eq!(gb.mmu.read(0xFE9F), 0x60);
}
