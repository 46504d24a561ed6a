//! # Output Configuration and Progress Rendering
//!
//! This module controls how the CLI draws things: whether colors and emojis
//! are used, and how sync progress is rendered.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Renderers
//!
//! Both renderers run on the single consumer thread of a
//! [`ChannelSink`](crate::progress::ChannelSink):
//!
//! - [`BarRenderer`]: one `indicatif` bar per repository, for interactive
//!   terminals.
//! - [`LineRenderer`]: one line per phase change on stderr, for logs and CI.

use std::collections::HashMap;
use std::env;
use std::io::Write;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::progress::{Phase, ProgressEvent, Renderer};

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// `--color=always` overrides `NO_COLOR`; `auto` detects from the
    /// environment and whether stdout is a terminal.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        console::set_colors_enabled(use_color);
        console::set_colors_enabled_stderr(use_color);
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables colors, even if empty
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns `emoji_str` when colors are enabled, `plain` otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// True if progress bars can be drawn on stderr.
pub fn is_interactive() -> bool {
    console::Term::stderr().features().is_attended()
}

/// Draws one progress bar per repository.
pub struct BarRenderer {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    style: ProgressStyle,
    output: OutputConfig,
}

impl BarRenderer {
    pub fn new(output: OutputConfig) -> Self {
        Self::with_target(output, ProgressDrawTarget::stderr())
    }

    pub fn with_target(output: OutputConfig, target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template("{prefix:>20.bold} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
            style,
            output,
        }
    }

    fn bar_for(&mut self, name: &str) -> &ProgressBar {
        let multi = &self.multi;
        let style = &self.style;
        self.bars.entry(name.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_prefix(name.to_string());
            bar
        })
    }
}

impl Renderer for BarRenderer {
    fn render(&mut self, event: &ProgressEvent) {
        let output = self.output.clone();
        let bar = self.bar_for(&event.repo_name);

        if let Some(percent) = event.percent {
            bar.set_position(percent.clamp(0.0, 100.0) as u64);
        }

        match event.phase {
            Phase::Complete => {
                bar.set_position(100);
                bar.finish_with_message(format!(
                    "{} {}",
                    emoji(&output, "✅", "[OK]"),
                    style(&event.message).green()
                ));
            }
            Phase::Failed => {
                bar.abandon_with_message(format!(
                    "{} {}",
                    emoji(&output, "❌", "[FAIL]"),
                    style(event.error.as_deref().unwrap_or(&event.message)).red()
                ));
            }
            phase => {
                let message = if event.message.is_empty() {
                    phase.to_string()
                } else {
                    format!("{}: {}", phase, event.message)
                };
                bar.set_message(message);
            }
        }
    }

    fn finish(&mut self, _elapsed: Duration) {
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
        self.bars.clear();
        let _ = self.multi.clear();
    }
}

/// Prints one line per phase change, without redrawing.
pub struct LineRenderer<W: Write + Send> {
    out: W,
    last_phase: HashMap<String, Phase>,
    output: OutputConfig,
}

impl LineRenderer<std::io::Stderr> {
    pub fn stderr(output: OutputConfig) -> Self {
        Self::new(std::io::stderr(), output)
    }
}

impl<W: Write + Send> LineRenderer<W> {
    pub fn new(out: W, output: OutputConfig) -> Self {
        Self {
            out,
            last_phase: HashMap::new(),
            output,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for LineRenderer<W> {
    fn render(&mut self, event: &ProgressEvent) {
        // Intermediate updates within a phase would flood the log
        if self.last_phase.get(&event.repo_name) == Some(&event.phase) {
            return;
        }
        self.last_phase.insert(event.repo_name.clone(), event.phase);

        let marker = match event.phase {
            Phase::Complete => emoji(&self.output, "✅", "[OK]"),
            Phase::Failed => emoji(&self.output, "❌", "[FAIL]"),
            _ => emoji(&self.output, "🔄", "[..]"),
        };
        let detail = event.error.as_deref().unwrap_or(&event.message);
        let _ = writeln!(
            self.out,
            "{} {} {}{}",
            marker,
            event.repo_name,
            event.phase,
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {}", detail)
            }
        );
    }

    fn finish(&mut self, _elapsed: Duration) {
        self.last_phase.clear();
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_color_always() {
        let config = OutputConfig::from_env_and_flag("always");
        assert!(config.use_color);
    }

    #[test]
    fn test_color_never() {
        let config = OutputConfig::from_env_and_flag("never");
        assert!(!config.use_color);
    }

    #[test]
    fn test_emoji_helper() {
        assert_eq!(emoji(&OutputConfig::with_color(), "✅", "[OK]"), "✅");
        assert_eq!(emoji(&OutputConfig::without_color(), "✅", "[OK]"), "[OK]");
    }

    #[test]
    fn test_line_renderer_prints_each_phase_once() {
        let mut renderer = LineRenderer::new(Vec::new(), OutputConfig::without_color());
        let started = Utc::now();

        renderer.render(&ProgressEvent::new("api", "u", Phase::Init, started).with_message("Starting..."));
        renderer.render(&ProgressEvent::new("api", "u", Phase::Fetching, started).with_percent(Some(10.0)));
        renderer.render(&ProgressEvent::new("api", "u", Phase::Fetching, started).with_percent(Some(90.0)));
        renderer.render(
            &ProgressEvent::new("api", "u", Phase::Complete, started).with_message("Synced at 01234567"),
        );
        renderer.finish(Duration::ZERO);

        let text = String::from_utf8(renderer.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[..] api init: Starting...",
                "[..] api fetching",
                "[OK] api complete: Synced at 01234567",
            ]
        );
    }

    #[test]
    fn test_bar_renderer_finishes_bars() {
        let mut renderer =
            BarRenderer::with_target(OutputConfig::without_color(), ProgressDrawTarget::hidden());
        let started = Utc::now();

        renderer.render(&ProgressEvent::new("api", "u", Phase::Fetching, started).with_percent(Some(40.0)));
        assert_eq!(renderer.bars["api"].position(), 40);

        renderer.render(&ProgressEvent::new("api", "u", Phase::Complete, started));
        assert!(renderer.bars["api"].is_finished());

        renderer.finish(Duration::ZERO);
        assert!(renderer.bars.is_empty());
    }
}
