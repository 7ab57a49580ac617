//! Command grammar and settings dispatcher for the attached-mode console.
//!
//! The grammar is a set of `winnow` combinators over the assembled line;
//! [`CommandEngine`] applies parsed commands to the shared [`DeviceStatus`]
//! and answers with bounded key=value replies. Keywords match
//! case-insensitively. A line that fails to parse produces an error reply and
//! leaves everything except the unconditional stream-disable of command
//! intake untouched.

use core::fmt::Write;

use winnow::ascii::{Caseless, digit1, space1};
use winnow::combinator::{alt, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::devices::{CommandDispatcher, CommandOrigin, HealthCounter, ReplyLine};
use crate::led::LedColor;
use crate::status::{ActionFlags, AttachState, DeviceStatus};

/// Default delay before a deferred action fires, in seconds.
pub const DEFAULT_ACTION_DELAY_S: u16 = 3;

/// Accepted streaming rate range in Hz.
pub const RATE_RANGE: core::ops::RangeInclusive<u16> = 1..=400;

/// Parsed console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// `stream [on|off]`; the bare form enables streaming.
    Stream(Option<bool>),
    /// `rate <hz>`.
    Rate(u16),
    /// `led <color|auto>`; `auto` releases the override.
    Led(Option<LedColor>),
    /// `mount [on|off]`; the bare form exposes the media.
    Mount(Option<bool>),
    /// `battery`.
    Battery,
    /// `status`.
    Status,
    /// `reset [<seconds>]`.
    Reset { delay_s: Option<u16> },
    /// `format [quick|full] [<seconds>]`.
    Format { full: bool, delay_s: Option<u16> },
}

/// Marker error for a line the grammar rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CommandSyntaxError;

fn on_off(input: &mut &str) -> ModalResult<bool> {
    alt((Caseless("on").value(true), Caseless("off").value(false))).parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<u16> {
    digit1.parse_to().parse_next(input)
}

fn color(input: &mut &str) -> ModalResult<Option<LedColor>> {
    alt((
        Caseless("auto").value(None),
        take_while(1.., |c: char| c.is_ascii_alphabetic())
            .verify_map(LedColor::from_name)
            .map(Some),
    ))
    .parse_next(input)
}

fn stream(input: &mut &str) -> ModalResult<Command> {
    preceded(Caseless("stream"), opt(preceded(space1, on_off)))
        .map(Command::Stream)
        .parse_next(input)
}

fn rate(input: &mut &str) -> ModalResult<Command> {
    preceded((Caseless("rate"), space1), number)
        .map(Command::Rate)
        .parse_next(input)
}

fn led(input: &mut &str) -> ModalResult<Command> {
    preceded((Caseless("led"), space1), color)
        .map(Command::Led)
        .parse_next(input)
}

fn mount(input: &mut &str) -> ModalResult<Command> {
    preceded(Caseless("mount"), opt(preceded(space1, on_off)))
        .map(Command::Mount)
        .parse_next(input)
}

fn battery(input: &mut &str) -> ModalResult<Command> {
    Caseless("battery").value(Command::Battery).parse_next(input)
}

fn status_report(input: &mut &str) -> ModalResult<Command> {
    Caseless("status").value(Command::Status).parse_next(input)
}

fn reset(input: &mut &str) -> ModalResult<Command> {
    preceded(Caseless("reset"), opt(preceded(space1, number)))
        .map(|delay_s| Command::Reset { delay_s })
        .parse_next(input)
}

fn format(input: &mut &str) -> ModalResult<Command> {
    preceded(
        Caseless("format"),
        (
            opt(preceded(
                space1,
                alt((Caseless("full").value(true), Caseless("quick").value(false))),
            )),
            opt(preceded(space1, number)),
        ),
    )
    .map(|(full, delay_s)| Command::Format {
        full: full.unwrap_or(false),
        delay_s,
    })
    .parse_next(input)
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        stream,
        rate,
        led,
        mount,
        battery,
        status_report,
        reset,
        format,
    ))
    .parse_next(input)
}

/// Parses one trimmed command line.
pub fn parse(line: &str) -> Result<Command, CommandSyntaxError> {
    command.parse(line.trim()).map_err(|_| CommandSyntaxError)
}

/// Adjustable settings owned by the command engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Settings {
    /// Streaming sample rate in Hz.
    pub sample_rate_hz: u16,
    /// Set when a setting changed since the last persisted snapshot.
    pub dirty: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100,
            dirty: false,
        }
    }
}

/// Persistent wear counters surfaced through the dispatcher trait.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HealthCounters {
    /// Full-charge cycles from a depleted baseline.
    pub battery: u16,
    /// Restarts requested through deferred actions.
    pub restart: u16,
}

/// Settings/command engine backing the attached-mode console.
#[derive(Clone, Debug, Default)]
pub struct CommandEngine {
    settings: Settings,
    health: HealthCounters,
}

impl CommandEngine {
    /// Creates an engine with the given initial settings.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            health: HealthCounters::default(),
        }
    }

    /// Current settings snapshot.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current health counters.
    #[must_use]
    pub const fn health(&self) -> &HealthCounters {
        &self.health
    }

    fn apply(&mut self, command: Command, status: &mut DeviceStatus, reply: &mut ReplyLine) {
        match command {
            Command::Stream(enable) => {
                status.stream = enable.unwrap_or(true);
                let _ = write!(reply, "STREAM={}\r\n", u8::from(status.stream));
            }
            Command::Rate(hz) => {
                if RATE_RANGE.contains(&hz) {
                    self.settings.sample_rate_hz = hz;
                    self.settings.dirty = true;
                    status.sample_rate_hz = hz;
                    let _ = write!(reply, "RATE={hz}\r\n");
                } else {
                    let _ = write!(reply, "ERROR: rate out of range\r\n");
                }
            }
            Command::Led(color) => {
                status.led_override = color;
                let name = color.map_or("auto", LedColor::name);
                let _ = write!(reply, "LED={name}\r\n");
            }
            Command::Mount(mounted) => {
                status.disk_mounted = mounted.unwrap_or(true);
                let _ = write!(reply, "MOUNT={}\r\n", u8::from(status.disk_mounted));
            }
            Command::Battery => {
                let _ = write!(
                    reply,
                    "BATT={},FULL={}\r\n",
                    status.last_battery,
                    u8::from(status.battery_full)
                );
            }
            Command::Status => {
                let attach = match status.attach {
                    AttachState::Attached => 1,
                    AttachState::Detached => 0,
                    AttachState::Suspended => -1,
                };
                let _ = write!(
                    reply,
                    "ATTACH={attach},STREAM={},RATE={},BATT={},FULL={},INACT={},MOUNT={},ACTION={}\r\n",
                    u8::from(status.stream),
                    status.sample_rate_hz,
                    status.last_battery,
                    u8::from(status.battery_full),
                    status.inactivity,
                    u8::from(status.disk_mounted),
                    status.action_countdown,
                );
            }
            Command::Reset { delay_s } => {
                let delay = delay_s.unwrap_or(DEFAULT_ACTION_DELAY_S);
                status.schedule_action(ActionFlags::RESTART, delay);
                let _ = write!(reply, "RESET={}\r\n", status.action_countdown);
            }
            Command::Format { full, delay_s } => {
                let flags = if full {
                    ActionFlags::FORMAT_FULL
                } else {
                    ActionFlags::FORMAT_QUICK
                };
                let delay = delay_s.unwrap_or(DEFAULT_ACTION_DELAY_S);
                status.schedule_action(flags.with(ActionFlags::SAVE_SETTINGS), delay);
                let _ = write!(reply, "FORMAT={}\r\n", status.action_countdown);
            }
        }
    }
}

impl CommandDispatcher for CommandEngine {
    fn handle(
        &mut self,
        line: &str,
        origin: CommandOrigin,
        status: &mut DeviceStatus,
        reply: &mut ReplyLine,
    ) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        match parse(trimmed) {
            Ok(command) => self.apply(command, status, reply),
            Err(CommandSyntaxError) => {
                let _ = write!(reply, "ERROR: unknown command: {trimmed}\r\n");
            }
        }

        // Startup-script lines run silently.
        if origin == CommandOrigin::StartupScript {
            reply.clear();
        }
    }

    fn perform_action(&mut self, flags: ActionFlags) -> bool {
        if flags.contains(ActionFlags::SAVE_SETTINGS) {
            self.settings.dirty = false;
        }

        let formats_media = flags.contains(ActionFlags::FORMAT_QUICK)
            || flags.contains(ActionFlags::FORMAT_FULL);
        // Media re-initialization requires the host to re-enumerate the disk.
        let restart = flags.contains(ActionFlags::RESTART) || formats_media;
        if restart {
            self.increment_health_counter(HealthCounter::Restart);
        }
        restart
    }

    fn increment_health_counter(&mut self, counter: HealthCounter) {
        match counter {
            HealthCounter::Battery => self.health.battery = self.health.battery.saturating_add(1),
            HealthCounter::Restart => self.health.restart = self.health.restart.saturating_add(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(engine: &mut CommandEngine, line: &str, status: &mut DeviceStatus) -> ReplyLine {
        let mut reply = ReplyLine::new();
        engine.handle(line, CommandOrigin::Usb, status, &mut reply);
        reply
    }

    #[test]
    fn grammar_accepts_the_command_set() {
        assert_eq!(parse("stream"), Ok(Command::Stream(None)));
        assert_eq!(parse("stream off"), Ok(Command::Stream(Some(false))));
        assert_eq!(parse("RATE 200"), Ok(Command::Rate(200)));
        assert_eq!(parse("led red"), Ok(Command::Led(Some(LedColor::Red))));
        assert_eq!(parse("led AUTO"), Ok(Command::Led(None)));
        assert_eq!(parse("mount off"), Ok(Command::Mount(Some(false))));
        assert_eq!(parse("battery"), Ok(Command::Battery));
        assert_eq!(parse("status"), Ok(Command::Status));
        assert_eq!(parse("reset"), Ok(Command::Reset { delay_s: None }));
        assert_eq!(parse("reset 10"), Ok(Command::Reset { delay_s: Some(10) }));
        assert_eq!(
            parse("format full 5"),
            Ok(Command::Format {
                full: true,
                delay_s: Some(5)
            })
        );
        assert_eq!(
            parse("  format  "),
            Ok(Command::Format {
                full: false,
                delay_s: None
            })
        );
    }

    #[test]
    fn grammar_rejects_noise() {
        assert!(parse("reboot").is_err());
        assert!(parse("rate").is_err());
        assert!(parse("rate fast").is_err());
        assert!(parse("led crimson").is_err());
        assert!(parse("streaming").is_err());
        assert!(parse("stream maybe").is_err());
    }

    #[test]
    fn stream_commands_toggle_status() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        let reply = dispatch(&mut engine, "stream", &mut status);
        assert!(status.stream);
        assert_eq!(reply.as_str(), "STREAM=1\r\n");

        let reply = dispatch(&mut engine, "stream off", &mut status);
        assert!(!status.stream);
        assert_eq!(reply.as_str(), "STREAM=0\r\n");
    }

    #[test]
    fn rate_updates_settings_within_range() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        let reply = dispatch(&mut engine, "rate 200", &mut status);
        assert_eq!(reply.as_str(), "RATE=200\r\n");
        assert_eq!(status.sample_rate_hz, 200);
        assert_eq!(engine.settings().sample_rate_hz, 200);
        assert!(engine.settings().dirty);

        let reply = dispatch(&mut engine, "rate 401", &mut status);
        assert_eq!(reply.as_str(), "ERROR: rate out of range\r\n");
        assert_eq!(status.sample_rate_hz, 200);
    }

    #[test]
    fn led_override_set_and_released() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        dispatch(&mut engine, "led magenta", &mut status);
        assert_eq!(status.led_override, Some(LedColor::Magenta));

        let reply = dispatch(&mut engine, "led auto", &mut status);
        assert_eq!(status.led_override, None);
        assert_eq!(reply.as_str(), "LED=auto\r\n");
    }

    #[test]
    fn reset_schedules_restart_action() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        let reply = dispatch(&mut engine, "reset", &mut status);
        assert_eq!(status.action_countdown, DEFAULT_ACTION_DELAY_S);
        assert!(status.action_flags.contains(ActionFlags::RESTART));
        assert_eq!(reply.as_str(), "RESET=3\r\n");
    }

    #[test]
    fn format_schedules_media_action_with_settings_save() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        dispatch(&mut engine, "format full 5", &mut status);
        assert_eq!(status.action_countdown, 5);
        assert!(status.action_flags.contains(ActionFlags::FORMAT_FULL));
        assert!(status.action_flags.contains(ActionFlags::SAVE_SETTINGS));
    }

    #[test]
    fn unknown_lines_answer_with_an_error() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        let reply = dispatch(&mut engine, "calibrate", &mut status);
        assert_eq!(reply.as_str(), "ERROR: unknown command: calibrate\r\n");
        assert!(!status.stream);
    }

    #[test]
    fn empty_lines_are_ignored() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        let reply = dispatch(&mut engine, "   ", &mut status);
        assert!(reply.is_empty());
    }

    #[test]
    fn startup_script_lines_run_silently() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);
        let mut reply = ReplyLine::new();

        engine.handle("rate 50", CommandOrigin::StartupScript, &mut status, &mut reply);
        assert!(reply.is_empty());
        assert_eq!(status.sample_rate_hz, 50);
    }

    #[test]
    fn actions_report_restart_and_count_health() {
        let mut engine = CommandEngine::default();

        assert!(engine.perform_action(ActionFlags::RESTART));
        assert!(engine.perform_action(ActionFlags::FORMAT_QUICK));
        assert!(!engine.perform_action(ActionFlags::SAVE_SETTINGS));
        assert_eq!(engine.health().restart, 2);

        engine.increment_health_counter(HealthCounter::Battery);
        assert_eq!(engine.health().battery, 1);
    }

    #[test]
    fn save_settings_action_clears_dirty_flag() {
        let mut engine = CommandEngine::default();
        let mut status = DeviceStatus::new(100);

        dispatch(&mut engine, "rate 50", &mut status);
        assert!(engine.settings().dirty);

        engine.perform_action(ActionFlags::SAVE_SETTINGS);
        assert!(!engine.settings().dirty);
    }
}
