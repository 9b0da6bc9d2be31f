//! Render message specs to raw bytes on stdout.
//!
//! Usage:
//!   fw_render [OPTIONS] [SPEC ...]
//!   fw_render < specs.txt
//!
//! Each argument is one spec. With no arguments, specs are read from stdin,
//! one per line. Specs are responses unless --request is given.
//!
//! Options:
//!   --request, -q        Parse specs as requests instead of responses
//!   --freeze, -z         Print the frozen spec text instead of rendering
//!   --preview, -p        Strip pause and disconnect actions before rendering
//!   --staticdir DIR, -d  Root directory for file values (`<path`)
//!   --host HOST          Default Host header for rendered requests
//!
//! Exits nonzero on the first spec that fails to parse or render.

use faultwire::{parse_requests, parse_response, serve, Message, Settings};
use std::io::{self, Read, Write};

fn take_flag(args: &mut Vec<String>, long: &str, short: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == long || a == short) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn take_option(args: &mut Vec<String>, long: &str, short: &str) -> anyhow::Result<Option<String>> {
    if let Some(pos) = args.iter().position(|a| a == long || a == short) {
        if pos + 1 >= args.len() {
            anyhow::bail!("{} requires a value", long);
        }
        args.remove(pos);
        Ok(Some(args.remove(pos)))
    } else {
        Ok(None)
    }
}

fn render<M: Message>(msg: &M, settings: &Settings, freeze: bool, preview: bool) -> anyhow::Result<()> {
    let msg = if preview {
        msg.preview_safe()
    } else {
        msg.clone()
    };
    if freeze {
        println!("{}", msg.freeze(settings)?.spec());
        return Ok(());
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = serve(&msg, &mut out, settings)?;
    out.flush()?;
    if summary.disconnected {
        eprintln!("disconnected after {} byte(s)", summary.bytes_sent);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let as_request = take_flag(&mut args, "--request", "-q");
    let freeze = take_flag(&mut args, "--freeze", "-z");
    let preview = take_flag(&mut args, "--preview", "-p");
    let staticdir = take_option(&mut args, "--staticdir", "-d")?;
    let host = take_option(&mut args, "--host", "-h")?;

    let settings = Settings {
        staticdir: staticdir.map(Into::into),
        request_host: host,
        ..Default::default()
    };

    // One spec per argument, or one per stdin line.
    let specs: Vec<String> = if args.is_empty() {
        let mut src = String::new();
        io::stdin().read_to_string(&mut src)?;
        src.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    } else {
        args
    };
    if specs.is_empty() {
        anyhow::bail!("no specs given");
    }

    for spec in &specs {
        if as_request {
            let requests = match parse_requests(spec) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("{}", e);
                    eprintln!("{}", e.marked());
                    std::process::exit(1);
                }
            };
            for request in &requests {
                render(request, &settings, freeze, preview)?;
            }
        } else {
            let response = match parse_response(spec) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("{}", e);
                    eprintln!("{}", e.marked());
                    std::process::exit(1);
                }
            };
            render(&response, &settings, freeze, preview)?;
        }
    }
    Ok(())
}
