use tracing::info;

use crate::cmd::{connect, BridgeHandle, FirmwareArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: FirmwareArgs, format: OutputFormat) -> CliResult<i32> {
    let bridge = connect(&args.device, Vec::new())?;
    let version = query_version(bridge.as_ref())?;
    print_value("version", &version, format);
    Ok(SUCCESS)
}

fn query_version(bridge: &dyn BridgeHandle) -> CliResult<String> {
    let version = bridge
        .get_version()
        .map_err(|err| link_error("version query failed", err))?;
    info!(endpoint = bridge.endpoint(), %version, "firmware version");
    Ok(version)
}
