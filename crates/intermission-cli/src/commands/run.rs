//! Interactive session: drives a [`BreakSchedule`] from stdin commands and
//! prints every status update as one JSON line on stdout.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use intermission_core::{
    ActivityMonitor, ActivityTracker, AvPresenceGate, BreakSchedule, Clock, Config,
    InactivityListener, ManualDeviceProvider, ManualSleepWake, PowerEvent, RestartPoint,
    ScheduleStatus, TokioClock,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::CliResult;

const CAMERA_ID: &str = "camera";
const MICROPHONE_ID: &str = "microphone";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    Resume,
    Toggle,
    Skip,
    Delay(u64),
    Break(Option<u64>),
    LongBreak,
    Jump(usize),
    Restart(RestartPoint),
    /// Activity on one indicator, or on all of them.
    Active(Option<String>),
    Camera(bool),
    Mic(bool),
    Sleep,
    Wake,
    Status,
    Quit,
}

fn parse_switch(arg: Option<&str>) -> Result<bool, String> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err("expected 'on' or 'off'".into()),
    }
}

fn parse_number<T: FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    let arg = arg.ok_or_else(|| format!("missing {what}"))?;
    arg.parse()
        .map_err(|_| format!("cannot parse '{arg}' as {what}"))
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or("empty command")?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{name}'"));
        }

        let command = match name {
            "start" => Command::Start,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "toggle" => Command::Toggle,
            "skip" => Command::Skip,
            "delay" => Command::Delay(parse_number(arg, "seconds")?),
            "break" => Command::Break(arg.map(|_| parse_number(arg, "seconds")).transpose()?),
            "long-break" => Command::LongBreak,
            "jump" => Command::Jump(parse_number(arg, "cycle index")?),
            "restart" => Command::Restart(match arg {
                Some("app") => RestartPoint::AppStart,
                Some("schedule") => RestartPoint::ScheduleStart,
                Some("cycle") => RestartPoint::CycleStart,
                _ => return Err("expected 'app', 'schedule' or 'cycle'".into()),
            }),
            "active" => Command::Active(arg.map(str::to_string)),
            "camera" => Command::Camera(parse_switch(arg)?),
            "mic" => Command::Mic(parse_switch(arg)?),
            "sleep" => Command::Sleep,
            "wake" => Command::Wake,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {other}")),
        };

        let takes_arg = matches!(
            command,
            Command::Delay(_)
                | Command::Break(_)
                | Command::Jump(_)
                | Command::Restart(_)
                | Command::Active(_)
                | Command::Camera(_)
                | Command::Mic(_)
        );
        if arg.is_some() && !takes_arg {
            return Err(format!("'{name}' takes no arguments"));
        }
        Ok(command)
    }
}

/// Engine plus the in-process providers stdin commands poke at.
struct Session {
    engine: BreakSchedule,
    trackers: Vec<(String, ActivityTracker)>,
    camera: Arc<ManualDeviceProvider>,
    microphone: Arc<ManualDeviceProvider>,
    power: Arc<ManualSleepWake>,
}

impl Session {
    fn new(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);

        let mut trackers = Vec::new();
        let mut thresholds = Vec::new();
        for (name, threshold) in config.thresholds() {
            let tracker = ActivityTracker::new(clock.clone());
            thresholds.push(tracker.threshold(name.clone(), threshold));
            trackers.push((name, tracker));
        }

        let camera = Arc::new(ManualDeviceProvider::new().with_device(CAMERA_ID, false));
        let microphone = Arc::new(ManualDeviceProvider::new().with_device(MICROPHONE_ID, false));
        let inactivity = Arc::new(InactivityListener::new(
            ActivityMonitor::new(thresholds, clock.clone()),
            AvPresenceGate::new(camera.clone(), microphone.clone()),
        ));

        let engine = BreakSchedule::new(config.schedule(), clock, inactivity);
        let power = Arc::new(ManualSleepWake::new());
        engine.attach_sleep_wake(power.clone());

        Self {
            engine,
            trackers,
            camera,
            microphone,
            power,
        }
    }

    fn apply(&self, command: Command) -> CliResult {
        let engine = &self.engine;
        match command {
            Command::Start => engine.start(),
            Command::Pause => engine.pause(),
            Command::Resume => engine.resume(),
            Command::Toggle => engine.toggle_paused(),
            Command::Skip => engine.skip(),
            Command::Delay(secs) => engine.delay(Duration::from_secs(secs)),
            Command::Break(secs) => engine.start_break(secs.map(Duration::from_secs)),
            Command::LongBreak => engine.start_long_break(),
            Command::Jump(index) => engine.start_break_at(index)?,
            Command::Restart(point) => engine.restart_schedule(point),
            Command::Active(None) => self.trackers.iter().for_each(|(_, t)| t.record()),
            Command::Active(Some(name)) => {
                let (_, tracker) = self
                    .trackers
                    .iter()
                    .find(|(n, _)| *n == name)
                    .ok_or_else(|| format!("unknown activity indicator: {name}"))?;
                tracker.record();
            }
            Command::Camera(on) => self.camera.set_running(CAMERA_ID, on)?,
            Command::Mic(on) => self.microphone.set_running(MICROPHONE_ID, on)?,
            Command::Sleep => {
                self.power.emit(PowerEvent::Sleeping);
            }
            Command::Wake => {
                self.power.emit(PowerEvent::Awake);
            }
            Command::Status => print_status(&engine.status())?,
            Command::Quit => {}
        }
        Ok(())
    }
}

fn print_status(status: &ScheduleStatus) -> CliResult {
    println!("{}", serde_json::to_string(status)?);
    Ok(())
}

async fn print_statuses(mut rx: broadcast::Receiver<ScheduleStatus>) {
    loop {
        match rx.recv().await {
            Ok(status) => {
                if let Err(e) = print_status(&status) {
                    warn!(error = %e, "failed to print status");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "status printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub async fn run(config: Config) -> CliResult {
    let session = Session::new(&config);
    let printer = tokio::spawn(print_statuses(session.engine.subscribe()));
    info!(cycles = session.engine.schedule().len(), "intermission running");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => {
                if let Err(e) = session.apply(command) {
                    eprintln!("error: {e}");
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    session.engine.shutdown();
    printer.abort();
    info!("intermission stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!("delay 300".parse::<Command>(), Ok(Command::Delay(300)));
        assert_eq!("break".parse::<Command>(), Ok(Command::Break(None)));
        assert_eq!("break 60".parse::<Command>(), Ok(Command::Break(Some(60))));
        assert_eq!("jump 2".parse::<Command>(), Ok(Command::Jump(2)));
        assert_eq!(
            "restart schedule".parse::<Command>(),
            Ok(Command::Restart(RestartPoint::ScheduleStart))
        );
        assert_eq!("active".parse::<Command>(), Ok(Command::Active(None)));
        assert_eq!(
            "active mouse".parse::<Command>(),
            Ok(Command::Active(Some("mouse".into())))
        );
        assert_eq!("camera on".parse::<Command>(), Ok(Command::Camera(true)));
        assert_eq!("mic off".parse::<Command>(), Ok(Command::Mic(false)));
        assert_eq!("  long-break ".parse::<Command>(), Ok(Command::LongBreak));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!("delay".parse::<Command>().is_err());
        assert!("delay soon".parse::<Command>().is_err());
        assert!("camera maybe".parse::<Command>().is_err());
        assert!("restart now".parse::<Command>().is_err());
        assert!("skip 3".parse::<Command>().is_err());
        assert!("jump 1 2".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn session_routes_device_and_activity_commands() {
        let session = Session::new(&Config::default());
        session.apply(Command::Start).unwrap();
        session.apply(Command::Camera(true)).unwrap();
        assert!(session.engine.status().count == 1);

        session.apply(Command::Active(Some("keyboard".into()))).unwrap();
        assert!(session.apply(Command::Active(Some("pedal".into()))).is_err());
        assert!(session.apply(Command::Jump(99)).is_err());

        session.apply(Command::Jump(3)).unwrap();
        let status = session.engine.status();
        assert_eq!(status.cycle_index, 3);
        assert!(status.is_blocking);
        session.engine.shutdown();
    }
}
