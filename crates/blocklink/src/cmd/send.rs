use blocklink_frame::{DeviceRecord, Envelope, Payload};

use crate::cmd::{connect, BridgeHandle, SendArgs};
use crate::exit::{link_error, CliResult, SUCCESS};
use crate::output::{print_records, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let bridge = connect(&args.device, Vec::new())?;
    let ack = send_record(bridge.as_ref(), build_record(&args))?;
    print_records(&ack, "ack", format);
    Ok(SUCCESS)
}

fn build_record(args: &SendArgs) -> DeviceRecord {
    let data = match (&args.data, args.number) {
        (Some(text), _) => Some(Payload::from(text.as_str())),
        (None, Some(number)) => Some(Payload::from(number)),
        (None, None) => None,
    };
    DeviceRecord::new(args.group.as_str(), args.var, args.code, data)
}

fn send_record(bridge: &dyn BridgeHandle, record: DeviceRecord) -> CliResult<Vec<DeviceRecord>> {
    bridge
        .write(&Envelope::device_data(vec![record]))
        .map_err(|err| link_error("write failed", err))
}
