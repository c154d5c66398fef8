use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use chime_core::{EdgePolicy, Scheduler, TaskSpec};

/// Small end-to-end demo: a heartbeat every 30 seconds, a minute-mark cron
/// task gated on the heartbeat, and periodic snapshots of the task list.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let scheduler = Scheduler::new();
    let beats = Arc::new(AtomicU32::new(0));

    let heartbeat = {
        let beats = Arc::clone(&beats);
        scheduler
            .add(
                "@every 30s",
                TaskSpec::fallible(move || {
                    let n = beats.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(beat = n, "heartbeat");
                    Ok(())
                })
                .description("heartbeat"),
            )
            .await?
    };

    scheduler
        .add(
            "* * * * *",
            TaskSpec::fallible(|| {
                info!("minute mark");
                Ok(())
            })
            .description("minute report")
            .after(heartbeat, EdgePolicy::Stop),
        )
        .await?;

    scheduler.start();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(35)).await;
        println!("{}", serde_json::to_string_pretty(&scheduler.list())?);
    }

    scheduler.stop().done().await;
    info!(beats = beats.load(Ordering::SeqCst), "done");
    Ok(())
}
