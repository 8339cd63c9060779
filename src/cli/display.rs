use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use xo_templates::{models::TemplateSpec, progress::BuildEvent};

const BAR_LENGTH: u64 = 1000;

/// Live progress: one bar per template plus an overall bar.
pub struct BuildDisplay {
    overall: ProgressBar,
    bars: Vec<ProgressBar>,
    fractions: Vec<f64>,
}

impl BuildDisplay {
    pub fn new(multi: &MultiProgress, specs: &[TemplateSpec]) -> Self {
        let width = specs.iter().map(|s| s.target.name.len()).max().unwrap_or(0);

        let bars = specs
            .iter()
            .map(|spec| {
                let bar = multi.add(ProgressBar::new(BAR_LENGTH));
                bar.set_style(style("{prefix} [{bar:30}] {percent:>3}% {msg}"));
                bar.set_prefix(format!("{:width$}", spec.target.name, width = width));
                bar.set_message("Waiting");
                bar
            })
            .collect();

        let overall = multi.add(ProgressBar::new(BAR_LENGTH));
        overall.set_style(style("{prefix} [{bar:30}] {percent:>3}% {elapsed_precise}"));
        overall.set_prefix(format!("{:width$}", "Overall", width = width));

        Self {
            overall,
            bars,
            fractions: vec![0.0; specs.len()],
        }
    }

    /// Renders events until every sender is gone.
    pub async fn drive(mut self, mut events: mpsc::UnboundedReceiver<BuildEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }
        self.overall.finish();
    }

    fn apply(&mut self, event: BuildEvent) {
        match event {
            BuildEvent::StageStarted { pipeline, stage } => {
                if let Some(bar) = self.bars.get(pipeline) {
                    bar.set_message(stage.label());
                }
            }
            BuildEvent::Progress { pipeline, fraction } => {
                if let Some(bar) = self.bars.get(pipeline) {
                    bar.set_position(position(fraction));
                }
                if let Some(slot) = self.fractions.get_mut(pipeline) {
                    *slot = fraction;
                }
                self.refresh_overall();
            }
            BuildEvent::Finished { pipeline, succeeded } => {
                if let Some(bar) = self.bars.get(pipeline) {
                    if succeeded {
                        bar.finish_with_message("Template created");
                    } else {
                        bar.abandon_with_message("Failed");
                    }
                }
                // a failed build counts as done for the overall bar
                if let Some(slot) = self.fractions.get_mut(pipeline) {
                    *slot = 1.0;
                }
                self.refresh_overall();
            }
        }
    }

    fn refresh_overall(&self) {
        if self.fractions.is_empty() {
            return;
        }
        let mean = self.fractions.iter().sum::<f64>() / self.fractions.len() as f64;
        self.overall.set_position(position(mean));
    }
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_LENGTH as f64).round() as u64
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}
