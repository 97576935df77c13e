//! Console output of the poll loop.
//!
//! The loop describes what to show as a [`Block`] and hands it to a
//! [`Sink`]. [`Console`] draws blocks on a terminal: panels replace the screen
//! contents, notices and diagnostics are appended below them.

use std::io::{self, Write};

use chrono::{DateTime, Local};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, PrintStyledContent, Stylize},
    terminal::{Clear, ClearType},
};
use unicode_width::UnicodeWidthStr;

use crate::snapshot::Snapshot;

/// Something the poll loop wants shown.
#[derive(Clone, Debug, PartialEq)]
pub enum Block {
    /// A different track started playing.
    NowPlaying(Snapshot),

    /// Nothing is playing. Shown on every poll that finds nothing.
    Paused,

    /// Connecting failed and is attempted again.
    Retry { attempt: u32, max_retries: u32 },

    /// Connecting failed for good; the loop ends after this.
    Fatal { attempts: u32, error: String },

    /// A single poll failed.
    FetchFailed(String),

    /// Poll diagnostics, only in debug mode.
    Diagnostics(Diagnostics),

    /// The next poll was moved forward to the end of the track, only in
    /// debug mode.
    AwaitingTrackEnd,
}

/// State of the poll loop after one poll.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub now: f64,
    pub poll_interval: f64,
    pub last_track_id: Option<String>,
    pub ends_at: Option<f64>,
    pub premature_poll: bool,
}

/// Receiver of rendered blocks.
pub trait Sink {
    fn render(&mut self, block: Block);
}

/// Terminal sink.
pub struct Console<W: Write> {
    out: W,
}

impl Console<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))
    }

    fn draw(&mut self, block: &Block) -> io::Result<()> {
        match block {
            Block::NowPlaying(snapshot) => {
                self.clear()?;
                now_playing(snapshot).write(&mut self.out)?;
            }
            Block::Paused => {
                self.clear()?;
                let mut panel = Panel::new("Paused", Color::Yellow);
                panel.push(vec![Span::styled(
                    "Nothing is playing right now.",
                    Color::Yellow,
                )]);
                panel.write(&mut self.out)?;
            }
            Block::Retry {
                attempt,
                max_retries,
            } => {
                self.clear()?;
                let notice =
                    format!("Connecting failed. Retrying {attempt}/{max_retries}...").yellow();
                queue!(self.out, PrintStyledContent(notice), Print("\r\n"))?;
            }
            Block::Fatal { attempts, error } => {
                self.clear()?;
                let heading =
                    format!("Could not connect to Spotify after {attempts} attempts:").red();
                queue!(
                    self.out,
                    PrintStyledContent(heading.bold()),
                    Print(" "),
                    PrintStyledContent(error.as_str().red()),
                    Print("\r\n"),
                )?;
            }
            Block::FetchFailed(error) => {
                queue!(
                    self.out,
                    PrintStyledContent("Could not fetch what is playing:".red().bold()),
                    Print(" "),
                    PrintStyledContent(error.as_str().red()),
                    Print("\r\n"),
                )?;
            }
            Block::Diagnostics(diagnostics) => {
                queue!(
                    self.out,
                    PrintStyledContent(diagnostics.to_string().dim()),
                    Print("\r\n"),
                )?;
            }
            Block::AwaitingTrackEnd => {
                queue!(
                    self.out,
                    PrintStyledContent("Waiting for the track to end for a timely poll...".cyan().dim()),
                    Print("\r\n"),
                )?;
            }
        }

        self.out.flush()
    }
}

impl<W: Write> Sink for Console<W> {
    fn render(&mut self, block: Block) {
        // Rendering is best effort: a closed terminal must not stop polling.
        if let Err(e) = self.draw(&block) {
            warn!("could not render to console: {e}");
        }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DEBUG: now={:.2}, poll_interval={:.2}, last_track_id={}, ends_at={}, premature_poll={}",
            self.now,
            self.poll_interval,
            self.last_track_id.as_deref().unwrap_or("None"),
            self.ends_at
                .map_or_else(|| "None".to_owned(), |ends_at| format!("{ends_at:.2}")),
            self.premature_poll,
        )
    }
}

/// Formats an epoch timestamp as local wall clock time.
fn local_time(epoch: f64) -> Option<String> {
    #[expect(clippy::cast_possible_truncation)]
    let secs = epoch.floor() as i64;
    DateTime::from_timestamp(secs, 0)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
}

fn now_playing(snapshot: &Snapshot) -> Panel {
    let mut panel = Panel::new("Now Playing", Color::Cyan);

    panel.push(vec![Span::styled(&snapshot.title, Color::Magenta)]);
    panel.push(vec![
        Span::plain("by "),
        Span::styled(&snapshot.artist, Color::Yellow),
    ]);

    if let Some(ref url) = snapshot.cover_url {
        panel.push(vec![Span::link("cover", url.as_str())]);
    }

    if let Some(ends_at) = snapshot.ends_at {
        let line = match local_time(ends_at) {
            Some(time) => format!("ends at {time} | timestamp {ends_at:.0}"),
            None => format!("timestamp {ends_at:.0}"),
        };
        panel.push(vec![Span::styled(line, Color::DarkGrey)]);
    }

    panel
}

/// Piece of a panel line.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Span {
    Text { text: String, color: Option<Color> },
    Link { label: String, url: String },
}

impl Span {
    fn plain<S: Into<String>>(text: S) -> Self {
        Self::Text {
            text: text.into(),
            color: None,
        }
    }

    fn styled<S: Into<String>>(text: S, color: Color) -> Self {
        Self::Text {
            text: text.into(),
            color: Some(color),
        }
    }

    fn link<S: Into<String>>(label: S, url: S) -> Self {
        Self::Link {
            label: label.into(),
            url: url.into(),
        }
    }

    /// Visible text, without styling or escape sequences.
    fn visible(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::Link { label, .. } => label,
        }
    }

    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            Self::Text { text, color } => match color {
                Some(color) => queue!(out, PrintStyledContent(text.as_str().with(*color))),
                None => queue!(out, Print(text)),
            },
            // OSC 8 hyperlink; terminals without support show the label.
            Self::Link { label, url } => queue!(
                out,
                Print(format!("\x1b]8;;{url}\x1b\\")),
                PrintStyledContent(label.as_str().underlined()),
                Print("\x1b]8;;\x1b\\"),
            ),
        }
    }
}

/// Text in a box with rounded corners and the title in the top border.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Panel {
    title: String,
    border: Color,
    lines: Vec<Vec<Span>>,
}

impl Panel {
    fn new(title: &str, border: Color) -> Self {
        Self {
            title: title.to_owned(),
            border,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, line: Vec<Span>) {
        self.lines.push(line);
    }

    fn line_width(line: &[Span]) -> usize {
        line.iter().map(|span| span.visible().width()).sum()
    }

    /// Width between the vertical borders, including one space of padding
    /// on either side.
    fn inner_width(&self) -> usize {
        let content = self
            .lines
            .iter()
            .map(|line| Self::line_width(line))
            .max()
            .unwrap_or(0);
        content.max(self.title.width() + 2) + 2
    }

    fn top(&self) -> String {
        let title = format!(" {} ", self.title);
        let rest = self.inner_width() - title.width();
        let left = rest / 2;
        format!("╭{}{title}{}╮", "─".repeat(left), "─".repeat(rest - left))
    }

    fn bottom(&self) -> String {
        format!("╰{}╯", "─".repeat(self.inner_width()))
    }

    /// Panel as plain text.
    #[cfg(test)]
    fn plain(&self) -> Vec<String> {
        let inner = self.inner_width();
        let mut out = vec![self.top()];
        for line in &self.lines {
            let text: String = line.iter().map(Span::visible).collect();
            let pad = inner - 2 - text.width();
            out.push(format!("│ {text}{} │", " ".repeat(pad)));
        }
        out.push(self.bottom());
        out
    }

    fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let inner = self.inner_width();

        queue!(
            out,
            PrintStyledContent(self.top().with(self.border)),
            Print("\r\n")
        )?;

        for line in &self.lines {
            queue!(out, PrintStyledContent("│ ".with(self.border)))?;
            for span in line {
                span.write(out)?;
            }
            let pad = inner - 2 - Self::line_width(line);
            queue!(
                out,
                Print(" ".repeat(pad)),
                PrintStyledContent(" │".with(self.border)),
                Print("\r\n")
            )?;
        }

        queue!(
            out,
            PrintStyledContent(self.bottom().with(self.border)),
            Print("\r\n")
        )
    }
}
