//! Command-line schema for the `slugnote` binary.

use clap::{Parser, Subcommand};
use std::ops::Range;

#[derive(Parser, Debug)]
#[command(name = "slugnote")]
#[command(about = "Slug-addressed notes with session ownership")]
#[command(version)]
pub struct Cli {
    /// Admin token; grants admin reads and, for your own notes, visibility changes
    #[arg(long, global = true)]
    pub admin_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a private note owned by this profile
    New,
    /// Print a note you can see
    Show {
        slug: String,
    },
    /// List notes owned by this profile
    List {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Edit a note you own; edits are batched into one save
    Edit(EditArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct EditArgs {
    pub slug: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub emoji: Option<String>,

    /// Replace the whole body
    #[arg(long)]
    pub content: Option<String>,

    /// Append a line to the body
    #[arg(long, value_name = "LINE")]
    pub append: Vec<String>,

    /// Wrap a byte range of the body in `**`
    #[arg(long, value_name = "START..END", value_parser = parse_selection)]
    pub bold: Vec<Range<usize>>,

    /// Wrap a byte range of the body in `_`
    #[arg(long, value_name = "START..END", value_parser = parse_selection)]
    pub italic: Vec<Range<usize>>,

    /// Wrap a byte range of the body in backticks
    #[arg(long, value_name = "START..END", value_parser = parse_selection)]
    pub code: Vec<Range<usize>>,

    /// Quote every line touched by a byte range
    #[arg(long, value_name = "START..END", value_parser = parse_selection)]
    pub quote: Vec<Range<usize>>,

    /// Turn every line touched by a byte range into a bullet
    #[arg(long, value_name = "START..END", value_parser = parse_selection)]
    pub bullet: Vec<Range<usize>>,

    /// Mark the task item with this exact text as done
    #[arg(long, value_name = "TASK")]
    pub check: Vec<String>,

    /// Mark the task item with this exact text as not done
    #[arg(long, value_name = "TASK")]
    pub uncheck: Vec<String>,

    /// Set visibility (admin and owner only)
    #[arg(long)]
    pub public: Option<bool>,

    /// Save immediately instead of waiting for the quiet period
    #[arg(long)]
    pub now: bool,
}

impl EditArgs {
    pub fn has_edits(&self) -> bool {
        self.title.is_some()
            || self.emoji.is_some()
            || self.content.is_some()
            || !self.append.is_empty()
            || self.format_count() > 0
            || !self.check.is_empty()
            || !self.uncheck.is_empty()
            || self.public.is_some()
    }

    /// Number of range-based formatting edits.
    pub fn format_count(&self) -> usize {
        self.bold.len() + self.italic.len() + self.code.len() + self.quote.len() + self.bullet.len()
    }
}

/// Parses a `START..END` byte range.
fn parse_selection(raw: &str) -> Result<Range<usize>, String> {
    let (start, end) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected START..END, got `{raw}`"))?;
    let start = start
        .trim()
        .parse::<usize>()
        .map_err(|err| format!("invalid start `{start}`: {err}"))?;
    let end = end
        .trim()
        .parse::<usize>()
        .map_err(|err| format!("invalid end `{end}`: {err}"))?;
    if end < start {
        return Err(format!("range `{raw}` ends before it starts"));
    }
    Ok(start..end)
}
