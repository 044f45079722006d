use std::error::Error;

use clap::Parser;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{self, AsyncBufReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tictactoe_server::game::{Board, Mark};
use tictactoe_server::session::{ClientMessage, ConnectionId, ServerMessage};

/// Terminal client for tictactoe-server
#[derive(Parser, Debug)]
#[command(name = "tictactoe_cli")]
struct Args {
    /// Server WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:3000")]
    url: String,
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One line of user input
#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    Reconnect,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "quit" => Some(Command::Quit),
        "reconnect" => Some(Command::Reconnect),
        "reset" => Some(Command::Send(ClientMessage::ResetGame)),
        cell => cell
            .parse::<usize>()
            .ok()
            .map(|index| Command::Send(ClientMessage::MakeMove { index })),
    }
}

/// Open socket plus the task printing its pushes
struct Link {
    sink: SplitSink<Ws, Message>,
    listener: JoinHandle<()>,
}

impl Link {
    async fn open(url: &str) -> Result<Self, Box<dyn Error>> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (sink, stream) = ws_stream.split();
        println!("Connected to {}", url);
        Ok(Self {
            sink,
            listener: tokio::spawn(listen(stream)),
        })
    }

    fn is_open(&self) -> bool {
        !self.listener.is_finished()
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<(), Box<dyn Error>> {
        let json = serde_json::to_string(msg)?;
        self.sink.send(Message::text(json)).await?;
        Ok(())
    }

    async fn close(mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.listener.await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    println!("Commands: 0-8 to play a cell, `reset`, `reconnect`, `quit`");

    let mut link = Some(Link::open(&args.url).await?);
    let mut stdin = io::BufReader::new(io::stdin()).lines();

    while let Some(line) = stdin.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(command) = parse_command(&line) else {
            println!("Unknown command: {}", line.trim());
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Reconnect => {
                if let Some(old) = link.take() {
                    old.close().await;
                }
                match Link::open(&args.url).await {
                    Ok(new) => link = Some(new),
                    Err(e) => eprintln!("Reconnect failed: {}", e),
                }
            }
            Command::Send(msg) => match link.as_mut() {
                Some(open) if open.is_open() => {
                    if let Err(e) = open.send(&msg).await {
                        eprintln!("Send failed: {}", e);
                    }
                }
                _ => println!("Not connected. Type `reconnect` to rejoin."),
            },
        }
    }

    if let Some(open) = link {
        open.close().await;
    }
    Ok(())
}

/// Print every server push; resolves win/loss from our own seat.
async fn listen(mut stream: SplitStream<Ws>) {
    let mut me: Option<ConnectionId> = None;

    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        };

        let server_msg: ServerMessage = match serde_json::from_str(text.as_str()) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Unreadable message: {}", e);
                continue;
            }
        };

        match server_msg {
            ServerMessage::PlayerAssignment { slot, your_id } => {
                me = Some(your_id);
                println!("You are player {} ({})", slot, slot.mark());
            }
            ServerMessage::GameState { board, x_is_next } => render(&board, x_is_next),
            ServerMessage::RejectConnection { message } => println!("{}", message),
            ServerMessage::GameEnd { winner, players } => {
                let mine = players.iter().find(|p| Some(p.id) == me).map(|p| p.slot.mark());
                println!("{}", verdict(winner, mine));
            }
            ServerMessage::GameReset => {
                me = None;
                println!("Game was reset. Type `reconnect` to take a seat.");
            }
            ServerMessage::Error { message } => eprintln!("Server error: {}", message),
        }
    }

    println!("Disconnected. Type `reconnect` to rejoin or `quit` to exit.");
}

fn verdict(winner: Option<Mark>, mine: Option<Mark>) -> String {
    match (winner, mine) {
        (None, _) => "Draw".to_string(),
        (Some(w), Some(m)) if w == m => "Victory".to_string(),
        (Some(_), Some(_)) => "Defeat".to_string(),
        (Some(w), None) => format!("Winner: {}", w),
    }
}

fn render(board: &Board, x_is_next: bool) {
    println!("\n{}", board);
    match board.winner() {
        Some(mark) => println!("Winner: {}", mark),
        None if board.is_full() => println!("Board full"),
        None => {
            let next = if x_is_next { Mark::X } else { Mark::O };
            println!("Next player: {}", next);
        }
    }
}
