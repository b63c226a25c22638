//! Event routing: progress and spinner telemetry dispatched to named
//! display widgets.
//!
//! The widget registries are fields of the router instance: one router
//! per run, no shared state across runs or tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use preload_engine::{EventSink, SpinnerAction};

const BAR_TEMPLATE: &str = "{msg:24} [{bar:40}] {percent:>3}%";
const TICK_MILLIS: u64 = 100;

/// Routes telemetry events to per-name indicators.
///
/// Indicators are created lazily on first use and cached for the run's
/// duration; a second start for the same name reuses the existing
/// instance. Nothing is ever removed mid-run.
pub struct EventRouter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    spinners: Mutex<HashMap<String, ProgressBar>>,
}

impl EventRouter {
    /// Creates a router drawing to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stdout())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            spinners: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventRouter {
    fn progress(&self, name: &str, percentage: f64) {
        let mut bars = self.bars.lock().expect("progress registry poisoned");
        let bar = bars.entry(name.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(100));
            bar.set_style(
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .expect("valid progress template")
                    .progress_chars("=> "),
            );
            bar.set_message(name.to_string());
            bar
        });
        // Monotonic increase is the emitter's business, not enforced here.
        bar.set_position(percentage.clamp(0.0, 100.0).round() as u64);
    }

    fn spinner(&self, name: &str, action: SpinnerAction) {
        let mut spinners = self.spinners.lock().expect("spinner registry poisoned");
        match action {
            SpinnerAction::Start => {
                spinners.entry(name.to_string()).or_insert_with(|| {
                    let spinner = self.multi.add(ProgressBar::new_spinner());
                    spinner.set_message(name.to_string());
                    spinner.enable_steady_tick(Duration::from_millis(TICK_MILLIS));
                    spinner
                });
            }
            SpinnerAction::Stop => {
                if let Some(spinner) = spinners.get(name) {
                    if !spinner.is_finished() {
                        // Guard line so the stop is not overwritten by the
                        // spinner's last render.
                        eprintln!();
                        spinner.finish();
                    }
                }
            }
        }
    }
}
