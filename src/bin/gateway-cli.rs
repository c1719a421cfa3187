use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Query the plotter gateway for statistical data", long_about = None)]
struct Cli {
    /// Gateway base URL
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Use the persistent WebSocket endpoint instead of POST /data
    #[arg(long)]
    ws: bool,

    /// Print the raw response instead of pretty JSON
    #[arg(long)]
    raw: bool,

    /// Series UUID
    series: String,

    /// Range start, nanoseconds since the epoch
    #[arg(allow_hyphen_values = true)]
    start: i64,

    /// Range end, nanoseconds since the epoch
    #[arg(allow_hyphen_values = true)]
    end: i64,

    /// Bucket width exponent in [0, 63]
    point_width: u8,

    /// Echo tag, returned after the result on WebSocket
    tag: Option<String>,
}

impl Cli {
    fn payload(&self) -> String {
        let mut payload = format!(
            "{},{},{},{}",
            self.series, self.start, self.end, self.point_width
        );
        if let Some(tag) = &self.tag {
            payload.push(',');
            payload.push_str(tag);
        }
        payload
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let payload = cli.payload();

    if cli.ws {
        let url = format!("{}/dataws", websocket_base(&cli.url));
        let (mut socket, _) = connect_async(url.as_str()).await?;
        socket.send(Message::Text(payload.into())).await?;

        let result = next_text(&mut socket).await?;
        let tag = next_text(&mut socket).await?;
        print_result(&result, cli.raw)?;
        println!("tag: {}", tag);
        socket.close(None).await?;
    } else {
        let res = reqwest::Client::new()
            .post(format!("{}/data", cli.url))
            .body(payload)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            eprintln!("Error: gateway returned status {}", status);
        }
        print_result(&res.text().await?, cli.raw)?;
    }

    Ok(())
}

fn websocket_base(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

async fn next_text<S>(socket: &mut S) -> Result<String, Box<dyn std::error::Error>>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err("connection closed before the response arrived".into())
}

/// Results are JSON; error messages are plain text and printed as-is.
fn print_result(body: &str, raw: bool) -> Result<(), Box<dyn std::error::Error>> {
    match serde_json::from_str::<Value>(body) {
        Ok(json) if !raw => println!("{}", serde_json::to_string_pretty(&json)?),
        _ => println!("{}", body),
    }
    Ok(())
}
