//! End-to-end scenarios driving the engine purely through its public
//! API: cold start, a single note, Sysex parameter changes, checksum
//! rejection, and voice stealing under oversubscription.

use mt32emu::{MT32Error, PartialState, ReverbMode, Synth, SynthOptions};

fn sized_roms() -> (Vec<u8>, Vec<u8>) {
    (vec![0u8; 64 * 1024], vec![0u8; 64 * 1024])
}

fn opened_synth() -> Synth {
    let (control_rom, pcm_rom) = sized_roms();
    let mut synth = Synth::new();
    synth.open(&control_rom, &pcm_rom, SynthOptions::default()).unwrap();
    synth
}

#[test]
fn cold_open_produces_silence() {
    let mut synth = opened_synth();
    assert!(synth.is_open());
    assert!(!synth.is_active());

    let mut out = vec![1i16; 2 * 4096];
    synth.render(&mut out).unwrap();
    assert!(out.iter().all(|&sample| sample == 0));
}

#[test]
fn single_note_on_sounds_and_releases() {
    let mut synth = opened_synth();

    synth.play_msg_immediate(0x90_3c_64).unwrap(); // Note-On, middle C, velocity 100
    assert!(synth.is_active());
    assert!(synth.partial_states().iter().any(|s| *s != PartialState::Inactive));

    synth.play_msg_immediate(0x80_3c_40).unwrap(); // Note-Off

    let mut out = vec![0i16; 2 * 4096];
    let mut saw_sound = false;
    for _ in 0..200 {
        synth.render(&mut out).unwrap();
        if out.iter().any(|&sample| sample != 0) {
            saw_sound = true;
        }
        if !synth.is_active() {
            break;
        }
    }
    assert!(saw_sound, "note never produced any non-zero samples");
    assert!(!synth.is_active(), "note never fully released");
}

#[test]
fn reset_sysex_silences_every_part() {
    let mut synth = opened_synth();
    synth.play_msg_immediate(0x90_3c_64).unwrap();
    synth.play_msg_immediate(0x91_40_50).unwrap();
    assert!(synth.is_active());

    let data: [u8; 4] = [0x7F, 0x00, 0x00, 0x01];
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    let checksum = ((0x80 - (sum % 128)) % 128) as u8;
    let payload = [0x41, 0x10, 0x16, 0x12, data[0], data[1], data[2], data[3], checksum];

    synth.play_sysex_immediate(&payload).unwrap();
    assert!(!synth.is_active());
}

#[test]
fn reverb_mode_sysex_updates_reverb_mode() {
    let mut synth = opened_synth();
    assert!(synth.reverb_enabled());

    // F0 41 10 16 12 10 00 01 01 6E F7, framing bytes stripped: writes
    // byte 0x01 (Hall) to the System region's reverb-mode field at offset 1.
    let payload = [0x41, 0x10, 0x16, 0x12, 0x10, 0x00, 0x01, 0x01, 0x6E];
    synth.play_sysex_immediate(&payload).unwrap();

    let bytes = synth.read_memory(0x10_0001, 1);
    assert_eq!(bytes[0], ReverbMode::Hall as u8);
}

#[test]
fn checksum_failure_is_rejected_and_leaves_state_unchanged() {
    let mut synth = opened_synth();
    let before = synth.read_memory(0x10_0001, 1);

    let payload = [0x41, 0x10, 0x16, 0x12, 0x10, 0x00, 0x01, 0x01, 0x00];
    let result = synth.play_sysex_immediate(&payload);
    assert!(matches!(result, Err(MT32Error::SysexChecksumInvalid)));

    let after = synth.read_memory(0x10_0001, 1);
    assert_eq!(before, after);
}

#[test]
fn thirty_three_notes_on_a_32_partial_machine_steals_oldest() {
    let mut synth = opened_synth();
    assert_eq!(synth.partial_count(), 32);

    for key in 0..33u8 {
        synth.play_msg_immediate(0x90_00_64 | ((key as u32) << 8)).unwrap();
    }

    let active = synth.partial_states().iter().filter(|s| **s != PartialState::Inactive).count();
    assert!(active <= 32, "partial pool must never exceed its physical size");
    assert!(active > 0, "voice stealing must keep at least the newest notes sounding");
}

#[test]
fn closed_synth_rejects_every_entry_point() {
    let mut synth = Synth::new();
    assert!(matches!(synth.play_msg(0x90_3c_64, None), Err(MT32Error::NotOpen)));
    assert!(matches!(synth.play_msg_immediate(0x90_3c_64), Err(MT32Error::NotOpen)));
    assert!(matches!(synth.play_sysex_immediate(&[0x41, 0x10, 0x16, 0x12]), Err(MT32Error::NotOpen)));

    let mut out = vec![0i16; 16];
    assert!(matches!(synth.render(&mut out), Err(MT32Error::NotOpen)));
}

#[test]
fn reopening_after_close_starts_fresh() {
    let (control_rom, pcm_rom) = sized_roms();
    let mut synth = Synth::new();
    synth.open(&control_rom, &pcm_rom, SynthOptions::default()).unwrap();
    synth.play_msg_immediate(0x90_3c_64).unwrap();
    assert!(synth.is_active());

    synth.close();
    assert!(!synth.is_open());

    synth.open(&control_rom, &pcm_rom, SynthOptions::default()).unwrap();
    assert!(!synth.is_active());
}
