//! `icmp-ping`: command-line front end over [`icmplib::ping`]. Parses
//! flags with `clap`, prints with `crossterm`-styled output, and leaves all
//! protocol logic to the library.

use std::process::ExitCode;
use std::time::Duration;

use clap::{App, Arg};
use crossterm::style::Stylize;

use icmplib::{ping, PingOptions};

fn main() -> ExitCode {
    let matches = App::new("icmp-ping")
        .about("Ping a remote host over ICMP (IPv4 or IPv6).")
        .version("0.1.0")
        .arg(
            Arg::new("REMOTE")
                .takes_value(true)
                .required(true)
                .help("Hostname or IP address to ping"),
        )
        .arg(
            Arg::new("COUNT")
                .short('c')
                .long("count")
                .takes_value(true)
                .help("Number of Echo Requests to send (default 4)"),
        )
        .arg(
            Arg::new("TIMEOUT")
                .short('t')
                .long("timeout")
                .takes_value(true)
                .help("Per-probe timeout in milliseconds (default 2000)"),
        )
        .arg(
            Arg::new("INTERVAL")
                .short('i')
                .long("interval")
                .takes_value(true)
                .help("Delay between probes in milliseconds (default 1000)"),
        )
        .arg(
            Arg::new("TTL")
                .short('l')
                .long("ttl")
                .takes_value(true)
                .help("IP time-to-live / hop limit (default 64)"),
        )
        .arg(
            Arg::new("SIZE")
                .short('s')
                .long("size")
                .takes_value(true)
                .help("Payload size in bytes (default 56)"),
        )
        .arg(
            Arg::new("PRIVILEGED")
                .short('p')
                .long("privileged")
                .help("Use a raw socket instead of an unprivileged datagram socket"),
        )
        .get_matches();

    let remote = matches.value_of("REMOTE").expect("required");

    let mut options = PingOptions::default();
    if let Some(count) = matches.value_of("COUNT") {
        options.count = parse_or_exit(count, "COUNT");
    }
    if let Some(timeout) = matches.value_of("TIMEOUT") {
        options.timeout = Duration::from_millis(parse_or_exit(timeout, "TIMEOUT"));
    }
    if let Some(interval) = matches.value_of("INTERVAL") {
        options.interval = Duration::from_millis(parse_or_exit(interval, "INTERVAL"));
    }
    if let Some(ttl) = matches.value_of("TTL") {
        options.ttl = parse_or_exit(ttl, "TTL");
    }
    if let Some(size) = matches.value_of("SIZE") {
        options.payload_size = parse_or_exit(size, "SIZE");
    }
    options.privileged = matches.is_present("PRIVILEGED");

    println!(
        "ping {} ({} bytes of data)",
        remote.to_string().green(),
        options.payload_size.to_string().blue(),
    );

    match ping(remote, &options) {
        Ok(host) => {
            println!("{}", host);
            if host.is_alive() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("{} {}", "ping failed:".red(), err);
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
