//! The smallest useful client: connect, join a channel, say hello, echo
//! the stream.

use sirc::client::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut irc = Irc::new();
    irc.set_server("irc.libera.chat", 0);
    irc.set_nick("sirc-hello");
    irc.set_uname("sirc");
    irc.set_fname("sirc helloworld");

    irc.connect().await?;
    irc.write("JOIN #sirc-test").await?;
    irc.write("PRIVMSG #sirc-test :hello, world").await?;

    loop {
        match irc.read(0).await {
            Ok(Some(msg)) => {
                if msg.command() == "PING" {
                    let token = msg.param(0).unwrap_or("");
                    irc.write(&format!("PONG :{}", token)).await?;
                }
                println!("{}", msg);
            }
            Ok(None) => continue,
            Err(e) => {
                eprintln!("connection lost: {}", e);
                break;
            }
        }
    }

    Ok(())
}
