use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};

use crate::bot::{EngineError, EngineMove, EngineMoveKind, SearchEngine, SearchLimits};
use crate::movegen::FullMove;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const PERFT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
enum Control {
    UciOk,
    ReadyOk,
}

#[derive(Debug)]
enum PerftReply {
    Row(String),
    Done(u64),
}

/// A UCI engine running as a child process. Commands go down its stdin; a
/// reader thread sorts its stdout lines onto three channels: best-move
/// results, perft output, and handshake acknowledgements.
pub struct UciEngine {
    child: Child,
    stdin: ChildStdin,
    reader: Option<JoinHandle<()>>,
    perft: Receiver<PerftReply>,
    control: Receiver<Control>,
    position: String,
    moves: Vec<String>,
}

impl UciEngine {
    /// Launch the engine binary and complete the UCI handshake. The
    /// returned receiver delivers search results as they arrive.
    pub fn spawn(path: &str) -> Result<(Self, Receiver<Option<EngineMove>>), EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(EngineError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdout not piped".to_string()))?;

        let (results_tx, results_rx) = unbounded();
        let (perft_tx, perft_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let reader = thread::spawn(move || read_loop(stdout, results_tx, perft_tx, control_tx));

        let mut engine = Self {
            child,
            stdin,
            reader: Some(reader),
            perft: perft_rx,
            control: control_rx,
            position: String::from("position startpos"),
            moves: Vec::new(),
        };
        engine.send("uci")?;
        engine.wait_control(Control::UciOk)?;
        engine.send("isready")?;
        engine.wait_control(Control::ReadyOk)?;
        debug!("engine {} ready", path);
        Ok((engine, results_rx))
    }

    fn send(&mut self, command: &str) -> Result<(), EngineError> {
        trace!("-> {}", command);
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;
        Ok(())
    }

    fn wait_control(&self, expected: Control) -> Result<(), EngineError> {
        loop {
            match self.control.recv_timeout(HANDSHAKE_TIMEOUT) {
                Ok(token) if token == expected => return Ok(()),
                Ok(_) => continue,
                Err(_) => return Err(EngineError::Disconnected),
            }
        }
    }

    fn resend_position(&mut self) -> Result<(), EngineError> {
        let mut command = self.position.clone();
        if !self.moves.is_empty() {
            command.push_str(" moves ");
            command.push_str(&self.moves.join(" "));
        }
        self.send(&command)
    }
}

impl SearchEngine for UciEngine {
    fn new_game(&mut self) -> Result<(), EngineError> {
        self.send("ucinewgame")?;
        self.send("isready")?;
        self.wait_control(Control::ReadyOk)
    }

    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        self.position = format!("position fen {}", fen);
        self.moves.clear();
        self.resend_position()
    }

    fn legal_moves(&mut self) -> Result<Vec<String>, EngineError> {
        // Drain rows left over from an earlier query before issuing a new
        // one, so a slow engine cannot interleave stale output.
        while self.perft.try_recv().is_ok() {}
        self.send("go perft 1")?;

        let mut moves = Vec::new();
        loop {
            match self.perft.recv_timeout(PERFT_TIMEOUT) {
                Ok(PerftReply::Row(mv)) => moves.push(mv),
                Ok(PerftReply::Done(total)) => {
                    if total as usize != moves.len() {
                        warn!(
                            "perft reported {} nodes but listed {} moves",
                            total,
                            moves.len()
                        );
                    }
                    return Ok(moves);
                }
                Err(_) => return Err(EngineError::Disconnected),
            }
        }
    }

    fn search(&mut self, limits: SearchLimits) -> Result<(), EngineError> {
        self.send(&go_command(limits))
    }

    fn play_move(&mut self, mv: &str) -> Result<(), EngineError> {
        self.moves.push(mv.to_string());
        self.resend_position()
    }

    fn stop(&mut self) {
        let _ = self.send("stop");
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        let _ = self.send("quit");
        let _ = self.child.wait();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn read_loop(
    stdout: ChildStdout,
    results: Sender<Option<EngineMove>>,
    perft: Sender<PerftReply>,
    control: Sender<Control>,
) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        trace!("<- {}", line);
        let sent = if let Some(result) = parse_bestmove(&line) {
            results.send(result).is_ok()
        } else if let Some(mv) = parse_perft_row(&line) {
            perft.send(PerftReply::Row(mv)).is_ok()
        } else if let Some(total) = parse_nodes_searched(&line) {
            perft.send(PerftReply::Done(total)).is_ok()
        } else {
            match line.trim() {
                "uciok" => control.send(Control::UciOk).is_ok(),
                "readyok" => control.send(Control::ReadyOk).is_ok(),
                _ => true,
            }
        };
        if !sent {
            break;
        }
    }
}

// UCI engines report moves in coordinate notation where castling is
// already the two-squares-over king move, so Normal covers everything
// except an explicit promotion suffix. The outer Option says whether the
// line was a bestmove line at all; "bestmove (none)" carries an inner
// None, the engine's answer when it has no legal move.
fn parse_bestmove(line: &str) -> Option<Option<EngineMove>> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "bestmove" {
        return None;
    }
    let text = parts.next()?;
    if text == "(none)" {
        return Some(None);
    }
    let full = FullMove::parse(text)?;
    let kind = if full.promotion.is_some() {
        EngineMoveKind::Promotion
    } else {
        EngineMoveKind::Normal
    };
    Some(Some(EngineMove {
        from: full.from,
        to: full.to,
        promotion: full.promotion,
        kind,
    }))
}

// One line of "go perft 1" output, e.g. "e2e4: 1".
fn parse_perft_row(line: &str) -> Option<String> {
    let (mv, count) = line.split_once(':')?;
    let mv = mv.trim();
    FullMove::parse(mv)?;
    count.trim().parse::<u64>().ok()?;
    Some(mv.to_string())
}

// The perft summary line, "Nodes searched: 20".
fn parse_nodes_searched(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix("Nodes searched:")?
        .trim()
        .parse()
        .ok()
}

fn go_command(limits: SearchLimits) -> String {
    let mut command = String::from("go");
    if let Some(depth) = limits.depth {
        command.push_str(&format!(" depth {}", depth));
    }
    if let Some(nodes) = limits.nodes {
        command.push_str(&format!(" nodes {}", nodes));
    }
    if let Some(ms) = limits.movetime_ms {
        command.push_str(&format!(" movetime {}", ms));
    }
    command
}
