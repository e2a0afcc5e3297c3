//! percolate-cli — command-line frontend for the Percolate session gateway
//!
//! Talks to the HTTP surface of percolate-server. Every reply arrives in the
//! standard result envelope (`success` / `data` / `message` / `errorCode` /
//! `validationErrors`); the CLI unwraps it and renders either human-readable
//! text or, with `--json`, the raw `data` payload for scripting.
//!
//! # Subcommands
//! - `create <title>`                — create a session (you facilitate)
//! - `sessions`                      — list sessions, newest first
//! - `show <session-id>`             — session snapshot with participants
//! - `start|complete|close <id>`     — lifecycle transitions
//! - `join <id>`                     — join a session
//! - `note <id> <body> [-t <type>]`  — append a note
//! - `notes <id> [--after <seq>]`    — list notes
//! - `export <id>`                   — export a finished session as JSON
//! - `status`                        — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8970";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "percolate-cli",
    version,
    about = "Percolate structured-discussion sessions — command-line frontend"
)]
struct Cli {
    /// Percolate HTTP server URL (overrides PERCOLATE_HTTP_URL env var)
    #[arg(long, env = "PERCOLATE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Acting user id, sent as the x-user-id identity header
    #[arg(long, env = "PERCOLATE_USER_ID", default_value = "cli-user")]
    user: String,

    /// Print the raw data payload as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new session with yourself as facilitator
    Create {
        /// Session title
        title: String,
    },

    /// List sessions, newest first
    Sessions {
        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show one session with its participants
    Show {
        /// Session id (UUID)
        session_id: String,
    },

    /// Start the discussion (facilitator only)
    Start { session_id: String },

    /// Complete the discussion (facilitator only)
    Complete { session_id: String },

    /// Close the session permanently (facilitator only)
    Close { session_id: String },

    /// Join a session as a participant
    Join { session_id: String },

    /// Append a note to the session ledger
    Note {
        session_id: String,
        /// Note body text
        body: String,
        /// Note type: General, Decision, ActionItem, KeyPoint
        #[arg(short = 't', long, default_value = "General")]
        note_type: String,
    },

    /// List the notes of a session in sequence order
    Notes {
        session_id: String,
        /// Only notes with a sequence strictly greater than this
        #[arg(long)]
        after: Option<u64>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Export a completed or closed session as a JSON snapshot
    Export { session_id: String },

    /// Show Percolate server status
    Status,
}

// ============================================================================
// Result Envelope
// ============================================================================

/// The server's standard result envelope. Mirrors what every endpoint of the
/// HTTP surface returns regardless of status code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub validation_errors: Option<Vec<ValidationError>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub property_name: String,
    pub error_message: String,
}

/// Unwrap the envelope into its data payload, or a printable error string.
pub fn unwrap_envelope(envelope: Envelope) -> Result<Value, String> {
    if envelope.success {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }
    let code = envelope.error_code.unwrap_or_else(|| "ERROR".to_string());
    let mut text = format!(
        "{}: {}",
        code,
        envelope.message.unwrap_or_else(|| "request failed".to_string())
    );
    if let Some(errors) = envelope.validation_errors {
        for e in errors {
            text.push_str(&format!("\n  - {}: {}", e.property_name, e.error_message));
        }
    }
    Err(text)
}

// ============================================================================
// Rendering
// ============================================================================

/// One-line session summary: `<id>  <status>  <title>`.
pub fn render_session_line(session: &Value) -> String {
    format!(
        "{}  {:<11}  {}",
        session["id"].as_str().unwrap_or("?"),
        session["status"].as_str().unwrap_or("?"),
        session["title"].as_str().unwrap_or("?"),
    )
}

/// One-line note rendering: `#<seq> [<type>] <author>: <body>`.
pub fn render_note_line(note: &Value) -> String {
    format!(
        "#{} [{}] {}: {}",
        note["sequence"].as_u64().unwrap_or(0),
        note["noteType"].as_str().unwrap_or("?"),
        note["authorId"].as_str().unwrap_or("?"),
        note["body"].as_str().unwrap_or(""),
    )
}

fn print_session_detail(data: &Value) {
    let session = &data["session"];
    println!("Session:      {}", session["title"].as_str().unwrap_or("?"));
    println!("Id:           {}", session["id"].as_str().unwrap_or("?"));
    println!("Status:       {}", session["status"].as_str().unwrap_or("?"));
    println!(
        "Facilitator:  {}",
        session["facilitatorId"].as_str().unwrap_or("?")
    );
    println!("Notes:        {}", data["noteCount"].as_u64().unwrap_or(0));
    if let Some(participants) = data["participants"].as_array() {
        println!("Participants:");
        for p in participants {
            let marker = if p["isActive"].as_bool().unwrap_or(false) {
                "*"
            } else {
                " "
            };
            println!(
                "  {} {} ({})",
                marker,
                p["displayName"].as_str().unwrap_or("?"),
                p["userId"].as_str().unwrap_or("?"),
            );
        }
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
    user: String,
}

impl Api {
    fn new(server: &str, user: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            user: user.to_string(),
        })
    }

    fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.server, path);
        let mut req = self
            .client
            .request(method, &url)
            .header("x-user-id", &self.user);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = match req.send() {
            Ok(r) => r,
            Err(e) => {
                eprintln!("percolate-cli: connection failed to {}: {}", url, e);
                std::process::exit(1);
            }
        };

        let envelope: Envelope = match resp.json() {
            Ok(env) => env,
            Err(e) => {
                eprintln!("percolate-cli: failed to parse server reply: {}", e);
                std::process::exit(1);
            }
        };

        match unwrap_envelope(envelope) {
            Ok(data) => Ok(data),
            Err(text) => {
                eprintln!("percolate-cli: {}", text);
                std::process::exit(1);
            }
        }
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.call(reqwest::Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        self.call(reqwest::Method::POST, path, Some(body))
    }
}

fn print_data(data: &Value, json: bool, render: impl FnOnce(&Value)) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
        );
    } else {
        render(data);
    }
}

fn do_status(api: &Api) -> anyhow::Result<()> {
    let url = format!("{}/health", api.server);
    let resp = api.client.get(&url).send();
    match resp {
        Ok(r) if r.status().is_success() => {
            let envelope: Envelope = r.json().unwrap_or(Envelope {
                success: false,
                data: None,
                message: None,
                error_code: None,
                validation_errors: None,
            });
            let data = envelope.data.unwrap_or_default();
            println!(
                "Percolate server: {}",
                data["status"].as_str().unwrap_or("unknown")
            );
            println!("Version:          {}", data["version"].as_str().unwrap_or("?"));
            println!("Sessions:         {}", data["sessions"].as_u64().unwrap_or(0));
        }
        Ok(r) => {
            eprintln!("percolate-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("percolate-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let api = match Api::new(&cli.server, &cli.user) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("percolate-cli: {}", e);
            std::process::exit(1);
        }
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Create { title } => api
            .post("/sessions", serde_json::json!({ "title": title }))
            .map(|data| {
                print_data(&data, json, |d| {
                    println!("Created session {}", d["session"]["id"].as_str().unwrap_or("?"));
                    println!("{}", render_session_line(&d["session"]));
                })
            }),

        Commands::Sessions { page } => api
            .get(&format!("/sessions?page={}", page))
            .map(|data| {
                print_data(&data, json, |d| {
                    let items = d["items"].as_array().cloned().unwrap_or_default();
                    if items.is_empty() {
                        println!("No sessions.");
                        return;
                    }
                    for s in &items {
                        println!("{}", render_session_line(s));
                    }
                    println!(
                        "Page {}/{} ({} total)",
                        d["currentPage"].as_u64().unwrap_or(1),
                        d["totalPages"].as_u64().unwrap_or(1),
                        d["totalCount"].as_u64().unwrap_or(0),
                    );
                })
            }),

        Commands::Show { session_id } => api
            .get(&format!("/sessions/{}", session_id))
            .map(|data| print_data(&data, json, print_session_detail)),

        Commands::Start { session_id } => api
            .post(&format!("/sessions/{}/start", session_id), Value::Null)
            .map(|data| {
                print_data(&data, json, |d| {
                    println!("{}", render_session_line(&d["session"]))
                })
            }),

        Commands::Complete { session_id } => api
            .post(&format!("/sessions/{}/complete", session_id), Value::Null)
            .map(|data| {
                print_data(&data, json, |d| {
                    println!("{}", render_session_line(&d["session"]));
                    println!(
                        "{} participants, {} notes",
                        d["participantCount"].as_u64().unwrap_or(0),
                        d["noteCount"].as_u64().unwrap_or(0),
                    );
                })
            }),

        Commands::Close { session_id } => api
            .post(&format!("/sessions/{}/close", session_id), Value::Null)
            .map(|data| {
                print_data(&data, json, |d| {
                    println!("{}", render_session_line(&d["session"]))
                })
            }),

        Commands::Join { session_id } => api
            .post(&format!("/sessions/{}/join", session_id), serde_json::json!({}))
            .map(|data| {
                print_data(&data, json, |d| {
                    println!(
                        "Joined as {} ({})",
                        d["participant"]["displayName"].as_str().unwrap_or("?"),
                        d["participant"]["role"].as_str().unwrap_or("?"),
                    )
                })
            }),

        Commands::Note {
            session_id,
            body,
            note_type,
        } => api
            .post(
                &format!("/sessions/{}/notes", session_id),
                serde_json::json!({ "body": body, "noteType": note_type }),
            )
            .map(|data| {
                print_data(&data, json, |d| println!("{}", render_note_line(&d["note"])))
            }),

        Commands::Notes {
            session_id,
            after,
            page,
        } => {
            let mut path = format!("/sessions/{}/notes?page={}", session_id, page);
            if let Some(after) = after {
                path.push_str(&format!("&afterSequence={}", after));
            }
            api.get(&path).map(|data| {
                print_data(&data, json, |d| {
                    let items = d["items"].as_array().cloned().unwrap_or_default();
                    if items.is_empty() {
                        println!("No notes.");
                        return;
                    }
                    for n in &items {
                        println!("{}", render_note_line(n));
                    }
                })
            })
        }

        Commands::Export { session_id } => api
            .get(&format!("/sessions/{}/export", session_id))
            .map(|data| {
                // Export is machine-oriented: always JSON.
                println!(
                    "{}",
                    serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
                )
            }),

        Commands::Status => do_status(&api),
    };

    if let Err(e) = result {
        eprintln!("percolate-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_json(raw: &str) -> Envelope {
        serde_json::from_str(raw).expect("envelope should parse")
    }

    // ========================================================================
    // TEST 1: Successful envelope unwraps to its data payload
    // ========================================================================
    #[test]
    fn test_unwrap_success_envelope() {
        let env = envelope_json(r#"{"success": true, "data": {"pong": true}}"#);
        let data = unwrap_envelope(env).expect("should unwrap");
        assert_eq!(data["pong"], true);
    }

    // ========================================================================
    // TEST 2: Failure envelope renders code and message
    // ========================================================================
    #[test]
    fn test_unwrap_failure_envelope() {
        let env = envelope_json(
            r#"{"success": false, "errorCode": "FORBIDDEN", "message": "only the facilitator may start the session"}"#,
        );
        let text = unwrap_envelope(env).unwrap_err();
        assert!(text.starts_with("FORBIDDEN: "));
        assert!(text.contains("facilitator"));
    }

    // ========================================================================
    // TEST 3: Validation errors are listed one per line
    // ========================================================================
    #[test]
    fn test_unwrap_validation_errors() {
        let env = envelope_json(
            r#"{"success": false, "errorCode": "INVALID_ARGUMENT", "message": "validation failed",
                "validationErrors": [
                    {"propertyName": "title", "errorMessage": "must not be empty"},
                    {"propertyName": "body", "errorMessage": "must not be empty"}
                ]}"#,
        );
        let text = unwrap_envelope(env).unwrap_err();
        assert!(text.contains("\n  - title: must not be empty"));
        assert!(text.contains("\n  - body: must not be empty"));
    }

    // ========================================================================
    // TEST 4: Session line renders id, status, title
    // ========================================================================
    #[test]
    fn test_render_session_line() {
        let session = serde_json::json!({
            "id": "7b5c24ab-1234-5678-9abc-def012345678",
            "status": "InProgress",
            "title": "Sprint retro",
        });
        let line = render_session_line(&session);
        assert!(line.starts_with("7b5c24ab-1234-5678-9abc-def012345678"));
        assert!(line.contains("InProgress"));
        assert!(line.ends_with("Sprint retro"));
    }

    // ========================================================================
    // TEST 5: Note line carries sequence, type, author, body
    // ========================================================================
    #[test]
    fn test_render_note_line() {
        let note = serde_json::json!({
            "sequence": 3,
            "noteType": "ActionItem",
            "authorId": "u-42",
            "body": "Ship the fix on Monday",
        });
        assert_eq!(
            render_note_line(&note),
            "#3 [ActionItem] u-42: Ship the fix on Monday"
        );
    }

    // ========================================================================
    // TEST 6: Missing fields degrade to placeholders, never panic
    // ========================================================================
    #[test]
    fn test_render_handles_missing_fields() {
        let line = render_session_line(&serde_json::json!({}));
        assert!(line.contains('?'));
        let line = render_note_line(&serde_json::json!({}));
        assert!(line.starts_with("#0"));
    }
}
