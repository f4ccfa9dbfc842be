use std::fs::File;
use std::io::{self, BufReader};

use anyhow::{Context, Result};
use serde_json::json;

use forumvote::config::Config;
use forumvote::logging::{log, obj, v_str, Domain, Level};
use forumvote::script::replay;
use forumvote::session::{ReconcileEvent, VoteSession};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    let backend = cfg.backend()?;
    let mut session = VoteSession::new(backend, cfg.reconcile);

    let source = std::env::args().nth(1);
    log(
        Level::Info,
        Domain::System,
        "start",
        obj(&[
            ("script", v_str(source.as_deref().unwrap_or("-"))),
            ("reconcile", v_str(&format!("{:?}", cfg.reconcile).to_lowercase())),
        ]),
    );

    let report = match source.as_deref() {
        None | Some("-") => replay(io::stdin().lock(), &mut session).await?,
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path))?;
            replay(BufReader::new(file), &mut session).await?
        }
    };

    for rendered in &report.rendered {
        println!("{}", serde_json::to_string(rendered)?);
    }

    let count = |pred: fn(&ReconcileEvent) -> bool| {
        report.reconciled.iter().filter(|e| pred(e)).count()
    };
    log(
        Level::Info,
        Domain::System,
        "summary",
        obj(&[
            ("clicks_confirmed", json!(count(|e| matches!(e, ReconcileEvent::Confirmed(_))))),
            ("failed", json!(count(|e| matches!(e, ReconcileEvent::Failed { .. })))),
            ("rolled_back", json!(count(|e| matches!(e, ReconcileEvent::RolledBack { .. })))),
            ("kept", json!(count(|e| matches!(e, ReconcileEvent::Kept { .. })))),
            ("items", json!(report.final_items)),
        ]),
    );
    Ok(())
}
