use wirerpc_fury::ProtocolRepository;

use crate::cmd::DescribeArgs;
use crate::demo;
use crate::exit::{fury_error, CliResult, SUCCESS};
use crate::output::{print_protocols, OutputFormat};

pub fn run(args: DescribeArgs, format: OutputFormat) -> CliResult<i32> {
    let repository = match &args.dir {
        Some(dir) => ProtocolRepository::from_directory(dir)
            .map_err(|err| fury_error(&format!("failed loading {}", dir.display()), err))?,
        None => {
            let mut repository = ProtocolRepository::new();
            repository.extend(demo::protocols());
            repository
        }
    };

    print_protocols(repository.methods(), format);
    Ok(SUCCESS)
}
