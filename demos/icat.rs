//! icat - a netcat for IRC.
//!
//! Links stdin/stdout to a channel: lines read from stdin are said in
//! the channel (lines starting with `/` are sent as raw protocol), and
//! channel traffic is printed to stdout. Exits when either side closes.

use std::env;
use std::process;
use std::time::Duration;

use chrono::Local;
use getopts::Options;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use sirc::client::prelude::*;
use sirc::util::{parse_hostspec, sasl_plain_blob};

struct Opts {
    server: String,
    port: u16,
    ssl: bool,
    nick: String,
    uname: Option<String>,
    fname: Option<String>,
    pass: Option<String>,
    proxy: Option<Proxy>,
    sasl: Option<(String, String)>,
    starttls: StarttlsMode,
    channels: Vec<String>,
    keepalive_secs: u64,
}

fn usage(program: &str, opts: &Options) -> ! {
    let brief = format!("Usage: {} [options] HOST[:PORT][/ssl]", program);
    print!("{}", opts.usage(&brief));
    process::exit(0)
}

fn parse_args() -> Opts {
    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("n", "nick", "nickname", "NICK");
    opts.optopt("u", "uname", "username", "UNAME");
    opts.optopt("f", "fname", "full name", "FNAME");
    opts.optopt("k", "pass", "server password", "PASS");
    opts.optopt("p", "proxy", "proxy spec", "TYPE:HOST:PORT");
    opts.optopt("c", "channels", "channels to join", "CHAN[,CHAN...]");
    opts.optopt("S", "sasl", "SASL PLAIN credentials", "USER:PASS");
    opts.optopt("T", "starttls", "STARTTLS mode (0=off 1=CAP 2=immediate)", "MODE");
    opts.optopt("w", "keepalive", "keepalive PING interval in seconds", "SECS");
    opts.optflag("v", "verbose", "chatty logging");
    opts.optflag("h", "help", "print this help");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2)
        }
    };
    if matches.opt_present("h") || matches.free.is_empty() {
        usage(&program, &opts);
    }

    if matches.opt_present("v") {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let (server, port, ssl) = parse_hostspec(&matches.free[0]);

    let proxy = matches.opt_str("p").map(|spec| match spec.parse() {
        Ok(px) => px,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2)
        }
    });

    let sasl = matches.opt_str("S").map(|cred| {
        match cred.split_once(':') {
            Some((user, pass)) => (user.to_owned(), pass.to_owned()),
            None => {
                eprintln!("-S wants USER:PASS");
                process::exit(2)
            }
        }
    });

    let starttls = matches
        .opt_str("T")
        .and_then(|m| m.parse::<u8>().ok())
        .and_then(StarttlsMode::from_index)
        .unwrap_or(StarttlsMode::Off);

    Opts {
        server,
        port,
        ssl,
        nick: matches.opt_str("n").unwrap_or_else(|| "icat".to_owned()),
        uname: matches.opt_str("u"),
        fname: matches.opt_str("f"),
        pass: matches.opt_str("k"),
        proxy,
        sasl,
        starttls,
        channels: matches
            .opt_str("c")
            .map(|c| c.split(',').map(str::to_owned).collect())
            .unwrap_or_default(),
        keepalive_secs: matches
            .opt_str("w")
            .and_then(|w| w.parse().ok())
            .unwrap_or(90),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let opts = parse_args();

    let mut irc = Irc::new();
    irc.set_server(&opts.server, opts.port);
    irc.set_ssl(opts.ssl)?;
    irc.set_nick(&opts.nick);
    if let Some(uname) = &opts.uname {
        irc.set_uname(uname);
    }
    if let Some(fname) = &opts.fname {
        irc.set_fname(fname);
    }
    if let Some(pass) = &opts.pass {
        irc.set_pass(pass);
    }
    if let Some(px) = &opts.proxy {
        irc.set_px(&px.host, px.port, px.kind);
    }
    if let Some((user, pass)) = &opts.sasl {
        irc.set_sasl("PLAIN", &sasl_plain_blob(user, pass), true);
    }
    if opts.starttls != StarttlsMode::Off {
        irc.set_starttls(opts.starttls, true)?;
    }

    irc.connect().await?;
    eprintln!("logged on as {}", irc.mynick());

    for chan in &opts.channels {
        irc.write(&format!("JOIN {}", chan)).await?;
    }
    let target = opts.channels.first().cloned();

    // Stdin is drained by its own task; the main loop interleaves the
    // queued lines with short-timeout socket reads.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let keepalive = Duration::from_secs(opts.keepalive_secs.max(1));
    let mut last_ping = std::time::Instant::now();

    'outer: loop {
        loop {
            match rx.try_recv() {
                Ok(line) if line.is_empty() => continue,
                Ok(line) => {
                    if let Some(raw) = line.strip_prefix('/') {
                        irc.write(raw).await?;
                    } else if let Some(target) = &target {
                        irc.write(&format!("PRIVMSG {} :{}", target, line)).await?;
                    } else {
                        irc.write(&line).await?;
                    }
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => break 'outer,
            }
        }

        if let Some(msg) = irc.read(250_000).await? {
            match msg.command() {
                "PING" => {
                    let token = msg.param(0).unwrap_or("").to_owned();
                    irc.write(&format!("PONG :{}", token)).await?;
                }
                "PRIVMSG" | "NOTICE" => {
                    let from = msg.prefix().map(sirc::proto::prefix_nick).unwrap_or("?");
                    let text = msg.param(1).unwrap_or("");
                    println!("<{}> {}", from, text);
                }
                _ => {}
            }
        }

        if last_ping.elapsed() >= keepalive {
            irc.write(&format!("PING :{}", Local::now().timestamp())).await?;
            last_ping = std::time::Instant::now();
        }
    }

    irc.write("QUIT :bye").await?;
    Ok(())
}
