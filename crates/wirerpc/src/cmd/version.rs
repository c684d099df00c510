use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("wirerpc {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!("protocol_version: {}", wirerpc_packet::PROTOCOL_VERSION);
    println!(
        "max_message_size: {}",
        wirerpc_transport::DEFAULT_MAX_MESSAGE
    );
    println!("target: {}", option_env!("WIRERPC_BUILD_TARGET").unwrap_or("unknown"));
    println!("profile: {}", option_env!("WIRERPC_BUILD_PROFILE").unwrap_or("unknown"));
    println!(
        "codecs: {}, {}, {}",
        wirerpc_packet::Codec::Json.name(),
        wirerpc_packet::Codec::Fury.name(),
        wirerpc_packet::Codec::Raw.name()
    );

    Ok(SUCCESS)
}
