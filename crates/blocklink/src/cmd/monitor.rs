use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use blocklink_frame::DeviceRecord;
use blocklink_session::Listener;
use tracing::info;

use crate::cmd::{connect, MonitorArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_records, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel();
    let forward: Listener = Arc::new(move |record: DeviceRecord| {
        let _ = tx.send(record);
    });

    let bridge = connect(&args.device, vec![forward])?;
    info!(endpoint = bridge.endpoint(), "monitoring device data");

    pump(&rx, &running, args.count, |record| {
        print_records(std::slice::from_ref(record), "device", format);
    });

    Ok(SUCCESS)
}

/// Hand records to `print` until `count` is reached or `running` clears.
///
/// Returns how many records were printed.
fn pump<F>(
    rx: &Receiver<DeviceRecord>,
    running: &AtomicBool,
    count: Option<usize>,
    mut print: F,
) -> usize
where
    F: FnMut(&DeviceRecord),
{
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        if count.is_some_and(|count| printed >= count) {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(record) => {
                print(&record);
                printed = printed.saturating_add(1);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    printed
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
