//! Output formatting for CLI responses.
//!
//! Supports both human-readable and JSON output formats for
//! integration with scripts and other tools.

use aspen_rmq::ScanReport;
use aspen_rmq::Stats;

/// Trait for types that can be output in multiple formats.
pub trait Outputable {
    /// Convert to JSON value for structured output.
    fn to_json(&self) -> serde_json::Value;

    /// Convert to human-readable string.
    fn to_human(&self) -> String;
}

/// Print a value in the appropriate format.
pub fn print_output<T: Outputable>(value: &T, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&value.to_json())
                .unwrap_or_else(|e| { format!("{{\"error\": \"failed to serialize: {}\"}}", e) })
        );
    } else {
        println!("{}", value.to_human());
    }
}

/// Print a success message.
pub fn print_success(message: &str, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "success",
                "message": message
            })
        );
    } else {
        println!("{}", message);
    }
}

/// One registered connection.
pub struct ConnectionEntry {
    pub name: String,
    pub is_alive: bool,
    pub is_self: bool,
}

/// Registered connections with liveness.
pub struct ConnectionListOutput {
    pub connections: Vec<ConnectionEntry>,
}

impl Outputable for ConnectionListOutput {
    fn to_json(&self) -> serde_json::Value {
        let connections: Vec<_> = self
            .connections
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "is_alive": c.is_alive,
                    "is_self": c.is_self
                })
            })
            .collect();
        serde_json::json!({
            "count": self.connections.len(),
            "connections": connections
        })
    }

    fn to_human(&self) -> String {
        if self.connections.is_empty() {
            return "No connections registered".to_string();
        }

        let mut output = format!("Connections ({})\n", self.connections.len());
        output.push_str("NAME                             STATE\n");
        for c in &self.connections {
            let state = if c.is_alive { "alive" } else { "dead" };
            let marker = if c.is_self { "  (this cli)" } else { "" };
            output.push_str(&format!("{:<32} {}{}\n", c.name, state, marker));
        }
        output.pop();
        output
    }
}

/// Liveness of a single connection.
pub struct CheckOutput {
    pub name: String,
    pub is_registered: bool,
    pub is_alive: bool,
}

impl Outputable for CheckOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "is_registered": self.is_registered,
            "is_alive": self.is_alive
        })
    }

    fn to_human(&self) -> String {
        let state = match (self.is_registered, self.is_alive) {
            (true, true) => "alive",
            (true, false) => "dead, awaiting recovery",
            (false, true) => "alive but not registered",
            (false, false) => "unknown",
        };
        format!("{}: {}", self.name, state)
    }
}

/// Result of a forced recovery scan.
pub struct ScanOutput {
    pub report: ScanReport,
}

impl Outputable for ScanOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.report).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }

    fn to_human(&self) -> String {
        let mut output = format!(
            "Checked {} connection(s), recovered {}",
            self.report.checked,
            self.report.recovered.len()
        );
        for recovery in &self.report.recovered {
            output.push_str(&format!(
                "\n  {}: moved {} message(s) from {} queue(s)",
                recovery.connection,
                recovery.moved,
                recovery.queues.len()
            ));
            if !recovery.is_complete {
                output.push_str(&format!(", {} failed, retry pending", recovery.failed));
            }
        }
        output
    }
}

/// Registered queue names.
pub struct QueueListOutput {
    pub queues: Vec<String>,
}

impl Outputable for QueueListOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "count": self.queues.len(),
            "queues": self.queues
        })
    }

    fn to_human(&self) -> String {
        if self.queues.is_empty() {
            return "No queues".to_string();
        }
        self.queues.join("\n")
    }
}

/// Queue stats snapshot.
pub struct StatsOutput {
    pub stats: Stats,
}

impl Outputable for StatsOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.stats).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }

    fn to_human(&self) -> String {
        if self.stats.queues.is_empty() {
            return "No queues".to_string();
        }
        self.stats.to_string().trim_end().to_string()
    }
}
