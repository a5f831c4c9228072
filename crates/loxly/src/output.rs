//! Output formatting: human lines, JSON lines, room and status tables.
//!
//! Events go to stdout one per line. Everything else the CLI prints
//! (banners, logs, errors) goes to stderr.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local, SecondsFormat};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use loxly_core::{RoomSummary, StateEvent, StateValue, StructureCatalog};

use crate::cli::{ColorMode, OutputFormat};

// ── Color ────────────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// One JSON line per event.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventLine<'a> {
    Initial {
        ts: String,
        uuid: String,
        name: &'a str,
        value: &'a StateValue,
    },
    Change {
        ts: String,
        uuid: String,
        name: &'a str,
        old: &'a StateValue,
        new: &'a StateValue,
    },
}

/// Renders events in the selected format.
#[derive(Debug, Clone, Copy)]
pub struct EventPrinter {
    format: OutputFormat,
    color: bool,
}

impl EventPrinter {
    pub fn new(format: OutputFormat, color: bool) -> Self {
        Self { format, color }
    }

    /// Render `event` as observed at `at`.
    pub fn render<Tz>(&self, event: &StateEvent, at: &DateTime<Tz>) -> String
    where
        Tz: chrono::TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match self.format {
            OutputFormat::Human => self.render_human(event, at),
            OutputFormat::Json => render_json_line(event, at),
        }
    }

    /// Render and print `event` stamped with the local time.
    pub fn print(&self, event: &StateEvent) {
        let line = self.render(event, &Local::now());
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }

    fn render_human<Tz>(&self, event: &StateEvent, at: &DateTime<Tz>) -> String
    where
        Tz: chrono::TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match event {
            StateEvent::Initial { name, value, .. } => {
                let ts = at.format("%H:%M:%S").to_string();
                if self.color {
                    format!("📍 {} {}: {}", ts.dimmed(), name.cyan(), value.bold())
                } else {
                    format!("📍 {ts} {name}: {value}")
                }
            }
            StateEvent::Changed { name, old, new, .. } => {
                let ts = at.format("%H:%M:%S%.3f").to_string();
                if self.color {
                    format!(
                        "⚡ {} {}: {} → {}",
                        ts.dimmed(),
                        name.cyan(),
                        old.dimmed(),
                        new.yellow().bold()
                    )
                } else {
                    format!("⚡ {ts} {name}: {old} → {new}")
                }
            }
        }
    }
}

fn render_json_line<Tz>(event: &StateEvent, at: &DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let ts = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let line = match event {
        StateEvent::Initial { id, name, value } => EventLine::Initial {
            ts,
            uuid: id.to_string(),
            name,
            value,
        },
        StateEvent::Changed { id, name, old, new } => EventLine::Change {
            ts,
            uuid: id.to_string(),
            name,
            old,
            new,
        },
    };
    // A struct of strings and plain values always serializes.
    serde_json::to_string(&line).unwrap_or_default()
}

// ── Rooms ────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "Room")]
    name: String,
    #[tabled(rename = "Controls")]
    controls: usize,
}

#[derive(Serialize)]
struct RoomJson<'a> {
    id: &'a str,
    name: &'a str,
    controls: usize,
}

pub fn render_rooms(format: OutputFormat, rooms: &[RoomSummary]) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Human => {
            let rows: Vec<RoomRow> = rooms
                .iter()
                .map(|r| RoomRow {
                    name: r.name.clone(),
                    controls: r.controls,
                })
                .collect();
            Ok(Table::new(rows).with(Style::rounded()).to_string())
        }
        OutputFormat::Json => {
            let rooms: Vec<RoomJson<'_>> = rooms
                .iter()
                .map(|r| RoomJson {
                    id: &r.id,
                    name: &r.name,
                    controls: r.controls,
                })
                .collect();
            serde_json::to_string_pretty(&rooms)
        }
    }
}

// ── Map ──────────────────────────────────────────────────────────────

#[derive(Tabled)]
struct MapRow<'a> {
    #[tabled(rename = "Room")]
    room: &'a str,
    #[tabled(rename = "Control")]
    control: &'a str,
    #[tabled(rename = "Type")]
    control_type: &'a str,
    #[tabled(rename = "UUID")]
    id: &'a str,
}

#[derive(Serialize)]
struct MapRoomJson<'a> {
    id: &'a str,
    name: &'a str,
    controls: Vec<MapControlJson<'a>>,
}

#[derive(Serialize)]
struct MapControlJson<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    control_type: &'a str,
}

/// Every room with the controls placed in it.
pub fn render_map(
    format: OutputFormat,
    catalog: &StructureCatalog,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Human => {
            let rows: Vec<MapRow<'_>> = catalog
                .rooms()
                .iter()
                .flat_map(|room| {
                    catalog.controls_in(&room.id).map(move |c| MapRow {
                        room: &room.name,
                        control: &c.name,
                        control_type: &c.control_type,
                        id: &c.id,
                    })
                })
                .collect();
            Ok(format!(
                "{}\n{} rooms, {} controls",
                Table::new(rows).with(Style::rounded()),
                catalog.rooms().len(),
                catalog.controls().len()
            ))
        }
        OutputFormat::Json => {
            let rooms: Vec<MapRoomJson<'_>> = catalog
                .rooms()
                .iter()
                .map(|room| MapRoomJson {
                    id: &room.id,
                    name: &room.name,
                    controls: catalog
                        .controls_in(&room.id)
                        .map(|c| MapControlJson {
                            id: &c.id,
                            name: &c.name,
                            control_type: &c.control_type,
                        })
                        .collect(),
                })
                .collect();
            serde_json::to_string_pretty(&rooms)
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Latest value of one state.
#[derive(Debug, Serialize)]
pub struct StatusRow {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub control_type: String,
    pub value: StateValue,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "State")]
    name: String,
    #[tabled(rename = "Type")]
    control_type: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn render_status(format: OutputFormat, rows: &[StatusRow]) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Human => {
            let table: Vec<StatusTableRow> = rows
                .iter()
                .map(|r| StatusTableRow {
                    name: r.name.clone(),
                    control_type: r.control_type.clone(),
                    value: r.value.to_string(),
                })
                .collect();
            Ok(Table::new(table).with(Style::rounded()).to_string())
        }
        OutputFormat::Json => serde_json::to_string_pretty(rows),
    }
}

/// Print to stdout.
pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Print a status line to stderr.
pub fn banner(message: &str, color: bool) {
    if color {
        eprintln!("{}", message.dimmed());
    } else {
        eprintln!("{message}");
    }
}
