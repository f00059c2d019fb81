//! `mmdb-lookup` -- locally query IP information out of a MaxMind DB file.

use std::net::IpAddr;
use std::process::ExitCode;
use std::str::FromStr;

use mmdb::Reader;

fn main() -> ExitCode {
    let mut verbose = false;
    let mut args = std::env::args();
    let program = args.next().unwrap();
    let program = std::path::Path::new(&program);
    let program = program.file_name().unwrap().to_string_lossy().into_owned();

    let args = args
        .filter(|x| {
            if x == "-v" || x == "--verbose" {
                verbose = true;
                false
            } else {
                true
            }
        })
        .collect::<Vec<_>>();

    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    if args.len() != 2 {
        eprintln!("{program} -- locally query ip information via a MaxMind DB database");
        eprintln!("USAGE: {program} <ip address> <mmdb_path>");
        eprintln!("   eg. {program} 1.1.1.1 ./GeoLite2-City.mmdb");
        eprintln!("FLAGS:");
        eprintln!("       --verbose (-v)      Enables verbose logging");
        return ExitCode::FAILURE;
    }

    let Ok(ip) = IpAddr::from_str(&args[0]) else {
        eprintln!("ERR: the provided ip address '{}' is invalid", args[0]);
        return ExitCode::FAILURE;
    };

    let reader = match Reader::open_file(&args[1]) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("ERR: failed to open '{}': {err}", args[1]);
            return ExitCode::FAILURE;
        }
    };

    match reader.lookup_value(ip) {
        Ok(Some(value)) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("No data found");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("ERR: lookup failed: {err}");
            ExitCode::FAILURE
        }
    }
}
