use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("blocklink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: blocklink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("BLOCKLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("protocol: line-delimited json");
    println!("default_baud: {}", blocklink_transport::DEFAULT_BAUD_RATE);
    println!(
        "features: session={}, unix={}, cli=true",
        cfg!(feature = "session"),
        cfg!(unix)
    );

    Ok(SUCCESS)
}
