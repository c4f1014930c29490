//! Prints the codes of the next five keys, one per row.
//!
//! Two seconds in, a timer thread injects a screen update through the
//! cross-thread channel, which interrupts the pending key read.

use anyhow::{Context, Result};
use std::thread;
use std::time::Duration;
use tasklet::{Handle, Scheduler};

const KEYS: u16 = 5;

async fn print_keys(handle: Handle) -> tasklet::Result<()> {
    let terminal = handle.terminal();
    terminal.clear()?;

    for row in 0..KEYS {
        let key = handle.request_input().await?;
        terminal.write_at(row, 0, &key.to_string())?;
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(None)
        .try_init()
        .ok();

    let mut scheduler = Scheduler::new().context("failed to create the scheduler")?;
    scheduler.open().context("failed to open the terminal")?;

    let remote = scheduler.remote();
    let timer = thread::spawn(move || {
        thread::sleep(Duration::from_secs(2));
        remote.schedule_threadsafe(|| {
            let written = Handle::current()
                .and_then(|handle| Ok(handle.terminal().write_at(7, 0, "x")?));
            if let Err(error) = written {
                log::warn!("timer update failed: {error}");
            }
        });
    });

    let task = scheduler.submit(print_keys(scheduler.handle()));
    let outcome = scheduler.run_until(&task);

    timer
        .join()
        .map_err(|_| anyhow::anyhow!("timer thread panicked"))?;
    scheduler.close()?;

    outcome?;
    Ok(())
}
