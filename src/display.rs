//! LCD / MIDI-message-LED state machine (`spec.md` §4, Display component).
//!
//! The real unit's 20-character LCD normally shows the active patch name
//! on the currently selected part, but a Sysex display-message write (or
//! an incoming MIDI event, which briefly lights the MESSAGE LED) can
//! override it. `Display` tracks that override and the LED, and reports
//! changes to the embedder's [`crate::ReportHandler`] rather than owning
//! any actual screen.

/// Text width of the LCD, in characters.
pub const LCD_WIDTH: usize = 20;

/// v2.6+ display compatibility mode: affects how a custom message
/// interacts with the part-name display (old MT-32 firmware clears the
/// override on the next Note-On; CM-32L's revised firmware leaves it
/// until a new Sysex message or timeout arrives).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayCompatibility {
    /// Matches original MT-32 firmware behavior.
    OldMt32,
    /// Matches revised CM-32L firmware behavior.
    NewCm32L,
}

/// Current LCD contents and MESSAGE LED state, queried by
/// `Synth::display_state`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayState {
    /// Exactly [`LCD_WIDTH`] characters, space-padded.
    pub text: String,
    /// `true` while the MESSAGE LED is lit (a MIDI event was recently received).
    pub midi_message_led: bool,
}

/// Drives the LCD/LED state machine from Sysex display writes and MIDI
/// traffic notifications; `Synth` calls into this every render tick and
/// every Sysex dispatch, and relays state changes to the report handler.
#[derive(Clone, Debug)]
pub struct Display {
    compatibility: DisplayCompatibility,
    part_name_text: String,
    override_text: Option<String>,
    /// Countdown of render samples remaining before an override message
    /// yields back to the part-name display (0 = no countdown active).
    override_hold_samples: u32,
    midi_message_led: bool,
    led_hold_samples: u32,
}

/// Render samples the MESSAGE LED stays lit after a MIDI event, at the
/// native 32 kHz rate (roughly matches firmware's ~150ms flash).
const LED_HOLD_SAMPLES: u32 = 4800;

/// Render samples a custom display message holds before reverting,
/// absent an explicit overwrite (roughly 2 seconds at 32 kHz).
const MESSAGE_HOLD_SAMPLES: u32 = 64_000;

impl Display {
    /// Builds a display showing blank part-name text.
    pub fn new(compatibility: DisplayCompatibility) -> Self {
        Display {
            compatibility,
            part_name_text: " ".repeat(LCD_WIDTH),
            override_text: None,
            override_hold_samples: 0,
            midi_message_led: false,
            led_hold_samples: 0,
        }
    }

    /// Current compatibility mode.
    pub fn compatibility(&self) -> DisplayCompatibility {
        self.compatibility
    }

    /// Sets the v2.6+ display compatibility mode.
    pub fn set_compatibility(&mut self, compatibility: DisplayCompatibility) {
        self.compatibility = compatibility;
    }

    /// Updates the underlying part-name text (what's shown absent an
    /// active override), e.g. after a Program Change.
    pub fn set_part_name_text(&mut self, text: &str) {
        self.part_name_text = pad_or_truncate(text);
    }

    /// Applies a Sysex display-message write, overriding the part-name
    /// text until it expires or is cleared.
    pub fn show_message(&mut self, text: &str) {
        self.override_text = Some(pad_or_truncate(text));
        self.override_hold_samples = MESSAGE_HOLD_SAMPLES;
    }

    /// Switches the LCD back to the part-name display immediately
    /// (`Synth::set_main_display_mode`).
    pub fn show_main_display(&mut self) {
        self.override_text = None;
        self.override_hold_samples = 0;
    }

    /// Notifies the display that a MIDI event arrived, lighting the
    /// MESSAGE LED for [`LED_HOLD_SAMPLES`].
    pub fn notify_midi_activity(&mut self) {
        self.midi_message_led = true;
        self.led_hold_samples = LED_HOLD_SAMPLES;
    }

    /// Notifies the display a note was struck on some part, which under
    /// `OldMt32` compatibility clears any pending display override (new
    /// CM-32L firmware instead lets the hold timer run out on its own).
    pub fn notify_note_on(&mut self) {
        if self.compatibility == DisplayCompatibility::OldMt32 && self.override_text.is_some() {
            self.override_text = None;
            self.override_hold_samples = 0;
        }
    }

    /// Advances hold timers by one render sample.
    pub fn tick(&mut self) {
        if self.override_hold_samples > 0 {
            self.override_hold_samples -= 1;
            if self.override_hold_samples == 0 {
                self.override_text = None;
            }
        }
        if self.led_hold_samples > 0 {
            self.led_hold_samples -= 1;
            if self.led_hold_samples == 0 {
                self.midi_message_led = false;
            }
        }
    }

    /// Current LCD text and LED state.
    pub fn state(&self) -> DisplayState {
        DisplayState {
            text: self.override_text.clone().unwrap_or_else(|| self.part_name_text.clone()),
            midi_message_led: self.midi_message_led,
        }
    }
}

fn pad_or_truncate(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().take(LCD_WIDTH).collect();
    chars.resize(LCD_WIDTH, ' ');
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_name_text_is_padded_to_lcd_width() {
        let mut display = Display::new(DisplayCompatibility::OldMt32);
        display.set_part_name_text("Piano 1");
        assert_eq!(display.state().text.len(), LCD_WIDTH);
        assert!(display.state().text.starts_with("Piano 1"));
    }

    #[test]
    fn sysex_message_overrides_part_name_until_expiry() {
        let mut display = Display::new(DisplayCompatibility::OldMt32);
        display.set_part_name_text("Piano 1");
        display.show_message("Hello!");
        assert!(display.state().text.starts_with("Hello!"));

        for _ in 0..MESSAGE_HOLD_SAMPLES {
            display.tick();
        }
        assert!(display.state().text.starts_with("Piano 1"));
    }

    #[test]
    fn old_mt32_compatibility_clears_override_on_note_on() {
        let mut display = Display::new(DisplayCompatibility::OldMt32);
        display.set_part_name_text("Piano 1");
        display.show_message("Hello!");
        display.notify_note_on();
        assert!(display.state().text.starts_with("Piano 1"));
    }

    #[test]
    fn new_cm32l_compatibility_keeps_override_through_note_on() {
        let mut display = Display::new(DisplayCompatibility::NewCm32L);
        display.set_part_name_text("Piano 1");
        display.show_message("Hello!");
        display.notify_note_on();
        assert!(display.state().text.starts_with("Hello!"));
    }

    #[test]
    fn midi_activity_lights_led_until_hold_expires() {
        let mut display = Display::new(DisplayCompatibility::OldMt32);
        display.notify_midi_activity();
        assert!(display.state().midi_message_led);
        for _ in 0..LED_HOLD_SAMPLES {
            display.tick();
        }
        assert!(!display.state().midi_message_led);
    }
}
