use std::fmt;

use log::{debug, warn};

use crate::audio::{CuePlayer, CueSpec, CueTable, LoopMode};
use crate::beacon::ProximityLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

/// What the warning surface should show for one proximity level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presentation {
    pub text: &'static str,
    pub color: Rgb,
    pub cue: CueSpec,
}

/// Fixed mapping from proximity level to presentation. Unknown and Far are
/// deliberately the same warning.
pub fn presentation_for(level: ProximityLevel) -> Presentation {
    match level {
        ProximityLevel::Unknown | ProximityLevel::Far => Presentation {
            text: "Is it true that most people get attacked by sharks in three feet \
                   of water about ten feet from the beach?",
            color: Rgb(238, 214, 175),
            cue: CueSpec {
                file: "Jaws2.mp3",
                slot: 0,
                loops: LoopMode::Infinite,
                volume: 5.0,
            },
        },
        ProximityLevel::Near => Presentation {
            text: "You're gonna need a bigger boat.",
            color: Rgb(206, 223, 239),
            cue: CueSpec {
                file: "Jaws6-loopable.mp3",
                slot: 1,
                loops: LoopMode::Infinite,
                volume: 1.0,
            },
        },
        ProximityLevel::Immediate => Presentation {
            text: "It was nice to know ya.",
            color: Rgb(138, 7, 7),
            cue: CueSpec {
                file: "Jaws7.mp3",
                slot: 2,
                loops: LoopMode::Once,
                volume: 1.0,
            },
        },
    }
}

#[allow(async_fn_in_trait)]
pub trait DisplaySink {
    async fn display(&mut self, level: ProximityLevel, presentation: &Presentation)
    -> anyhow::Result<()>;
}

/// Turns ranged proximity levels into display updates and audio cues.
///
/// Consecutive deliveries of the same level are collapsed into the first.
pub struct ProximityPresenter<D, P: CuePlayer> {
    display: D,
    cues: CueTable<P>,
    previous: ProximityLevel,
}

impl<D: DisplaySink, P: CuePlayer> ProximityPresenter<D, P> {
    pub fn new(display: D, cues: CueTable<P>) -> Self {
        ProximityPresenter {
            display,
            cues,
            previous: ProximityLevel::Unknown,
        }
    }

    pub async fn on_proximity_changed(&mut self, current: ProximityLevel) {
        if current == self.previous {
            return;
        }
        debug!("Proximity changed: {} -> {}", self.previous.as_str(), current.as_str());

        let presentation = presentation_for(current);
        if let Err(err) = self.display.display(current, &presentation).await {
            warn!("Failed to push display update: {err:#}");
        }
        self.cues.trigger(&presentation.cue).await;

        self.previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingDisplay {
        log: Log,
        fail: bool,
    }

    impl DisplaySink for RecordingDisplay {
        async fn display(
            &mut self,
            level: ProximityLevel,
            presentation: &Presentation,
        ) -> anyhow::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("display {} {}", level.as_str(), presentation.color));
            if self.fail {
                anyhow::bail!("broker unreachable");
            }
            Ok(())
        }
    }

    struct RecordingPlayer {
        log: Log,
    }

    struct RecordedCue {
        file: String,
    }

    impl CuePlayer for RecordingPlayer {
        type Cue = RecordedCue;

        fn load(&mut self, path: &Path) -> anyhow::Result<RecordedCue> {
            let file = path.file_name().unwrap().to_string_lossy().to_string();
            self.log.lock().unwrap().push(format!("load {file}"));
            Ok(RecordedCue { file })
        }

        async fn play(&mut self, cue: &mut RecordedCue, _loops: LoopMode, _volume: f32) {
            self.log.lock().unwrap().push(format!("play {}", cue.file));
        }

        async fn stop(&mut self, cue: &mut RecordedCue) {
            self.log.lock().unwrap().push(format!("stop {}", cue.file));
        }
    }

    fn presenter(fail_display: bool) -> (ProximityPresenter<RecordingDisplay, RecordingPlayer>, Log)
    {
        let log: Log = Arc::default();
        let display = RecordingDisplay {
            log: log.clone(),
            fail: fail_display,
        };
        let cues = CueTable::new(RecordingPlayer { log: log.clone() }, PathBuf::from("sounds"));
        (ProximityPresenter::new(display, cues), log)
    }

    #[test]
    fn test_presentation_table() {
        let far = presentation_for(ProximityLevel::Far);
        assert!(far.text.starts_with("Is it true"));
        assert_eq!(far.color, Rgb(238, 214, 175));
        assert_eq!(far.cue.file, "Jaws2.mp3");
        assert_eq!(far.cue.slot, 0);
        assert_eq!(far.cue.loops, LoopMode::Infinite);
        assert_eq!(far.cue.volume, 5.0);
        assert_eq!(presentation_for(ProximityLevel::Unknown), far);

        let near = presentation_for(ProximityLevel::Near);
        assert_eq!(near.text, "You're gonna need a bigger boat.");
        assert_eq!(near.color, Rgb(206, 223, 239));
        assert_eq!(near.cue.file, "Jaws6-loopable.mp3");
        assert_eq!(near.cue.slot, 1);
        assert_eq!(near.cue.loops, LoopMode::Infinite);
        assert_eq!(near.cue.volume, 1.0);

        let immediate = presentation_for(ProximityLevel::Immediate);
        assert_eq!(immediate.text, "It was nice to know ya.");
        assert_eq!(immediate.color, Rgb(138, 7, 7));
        assert_eq!(immediate.cue.file, "Jaws7.mp3");
        assert_eq!(immediate.cue.slot, 2);
        assert_eq!(immediate.cue.loops, LoopMode::Once);
    }

    #[test]
    fn test_color_hex_formatting() {
        assert_eq!(Rgb(238, 214, 175).to_string(), "#EED6AF");
        assert_eq!(Rgb(138, 7, 7).to_string(), "#8A0707");
    }

    #[tokio::test]
    async fn test_consecutive_duplicates_collapsed() {
        let (mut presenter, log) = presenter(false);
        presenter.on_proximity_changed(ProximityLevel::Far).await;
        presenter.on_proximity_changed(ProximityLevel::Far).await;
        presenter.on_proximity_changed(ProximityLevel::Far).await;

        let updates = log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("display"))
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn test_initial_unknown_is_suppressed() {
        let (mut presenter, log) = presenter(false);
        presenter.on_proximity_changed(ProximityLevel::Unknown).await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ranging_scenario() {
        let (mut presenter, log) = presenter(false);
        for level in [
            ProximityLevel::Far,
            ProximityLevel::Far,
            ProximityLevel::Near,
            ProximityLevel::Immediate,
            ProximityLevel::Unknown,
        ] {
            presenter.on_proximity_changed(level).await;
        }

        let entries = log.lock().unwrap();
        assert_eq!(
            *entries,
            vec![
                "display far #EED6AF",
                "load Jaws2.mp3",
                "play Jaws2.mp3",
                "display near #CEDFEF",
                "load Jaws6-loopable.mp3",
                "play Jaws6-loopable.mp3",
                "stop Jaws2.mp3",
                "display immediate #8A0707",
                "load Jaws7.mp3",
                "play Jaws7.mp3",
                "stop Jaws2.mp3",
                "stop Jaws6-loopable.mp3",
                "display unknown #EED6AF",
                "play Jaws2.mp3",
                "stop Jaws6-loopable.mp3",
                "stop Jaws7.mp3",
            ]
        );
    }

    #[tokio::test]
    async fn test_display_failure_does_not_stop_cues() {
        let (mut presenter, log) = presenter(true);
        presenter.on_proximity_changed(ProximityLevel::Near).await;
        presenter.on_proximity_changed(ProximityLevel::Near).await;

        let entries = log.lock().unwrap();
        let plays = entries.iter().filter(|e| e.starts_with("play")).count();
        let displays = entries.iter().filter(|e| e.starts_with("display")).count();
        assert_eq!(plays, 1);
        assert_eq!(displays, 1);
    }
}
