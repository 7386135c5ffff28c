//! `icmp-traceroute`: command-line front end over [`icmplib::traceroute`],
//! following the same `clap`/`crossterm` conventions as `icmp_ping.rs`.

use std::process::ExitCode;
use std::time::Duration;

use clap::{App, Arg};
use crossterm::style::Stylize;

use icmplib::{traceroute, TracerouteOptions};

fn main() -> ExitCode {
    let matches = App::new("icmp-traceroute")
        .about("Trace the route to a remote host over ICMP (IPv4 or IPv6).")
        .version("0.1.0")
        .arg(
            Arg::new("REMOTE")
                .takes_value(true)
                .required(true)
                .help("Hostname or IP address to trace"),
        )
        .arg(
            Arg::new("MAX_HOPS")
                .short('m')
                .long("max-hops")
                .takes_value(true)
                .help("Maximum TTL to probe (default 30)"),
        )
        .arg(
            Arg::new("COUNT")
                .short('q')
                .long("queries")
                .takes_value(true)
                .help("Probes per hop (default 3)"),
        )
        .arg(
            Arg::new("TIMEOUT")
                .short('t')
                .long("timeout")
                .takes_value(true)
                .help("Per-probe timeout in milliseconds (default 2000)"),
        )
        .arg(
            Arg::new("FAST")
                .short('f')
                .long("fast")
                .help("Stop probing a hop as soon as one reply arrives"),
        )
        .get_matches();

    let remote = matches.value_of("REMOTE").expect("required");

    let mut options = TracerouteOptions::default();
    if let Some(max_hops) = matches.value_of("MAX_HOPS") {
        options.max_hops = parse_or_exit(max_hops, "MAX_HOPS");
    }
    if let Some(count) = matches.value_of("COUNT") {
        options.count = parse_or_exit(count, "COUNT");
    }
    if let Some(timeout) = matches.value_of("TIMEOUT") {
        options.timeout = Duration::from_millis(parse_or_exit(timeout, "TIMEOUT"));
    }
    options.fast = matches.is_present("FAST");

    println!("traceroute to {}, {} hops max", remote.to_string().green(), options.max_hops);

    match traceroute(remote, &options) {
        Ok(hops) => {
            for hop in &hops {
                println!("{}", hop);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {}", "traceroute failed:".red(), err);
            ExitCode::FAILURE
        }
    }
}

fn parse_or_exit<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("{} invalid value for --{}: {:?}", "error:".red(), flag, value);
        std::process::exit(2);
    })
}
