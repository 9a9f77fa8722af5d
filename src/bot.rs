use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, warn};
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::board::{PromotionKind, Square};
use crate::fen;
use crate::game::Game;
use crate::movegen::{self, FullMove, MoveKind};
use crate::state::BoardState;

pub const MIN_DIFFICULTY: i32 = 0;
pub const MAX_DIFFICULTY: i32 = 10;
pub const DEFAULT_DIFFICULTY: i32 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("engine stopped responding")]
    Disconnected,
}

/// Limits handed to the engine for one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchLimits {
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub movetime_ms: Option<u64>,
}

/// Map a difficulty level to search limits. The mapping is monotonic in
/// strength but not linear: the low tiers throttle the node count for
/// near-random play, the high tiers raise the depth instead.
pub fn limits_for_difficulty(level: i32) -> SearchLimits {
    let level = clamp_difficulty(level);
    match level {
        0 => SearchLimits {
            depth: Some(1),
            nodes: Some(5),
            movetime_ms: None,
        },
        1 => SearchLimits {
            depth: Some(1),
            nodes: Some(10),
            movetime_ms: None,
        },
        2 => SearchLimits {
            depth: Some(1),
            nodes: Some(50),
            movetime_ms: None,
        },
        _ => SearchLimits {
            depth: Some((level - 2) as u32),
            nodes: None,
            movetime_ms: None,
        },
    }
}

pub fn clamp_difficulty(level: i32) -> i32 {
    level.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// How the engine itself tags a move it reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMoveKind {
    Normal,
    Promotion,
    EnPassant,
    Castling,
}

/// A best-move result in the engine's native encoding, before translation
/// into the rule engine's representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PromotionKind>,
    pub kind: EngineMoveKind,
}

/// What a finished search produced. `NoMove` is a definitive answer, not
/// a timeout: the engine searched and found no legal move to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Move(FullMove),
    NoMove,
}

/// The seam to an external search engine. Results arrive asynchronously on
/// the channel returned at construction (`None` when the engine reports it
/// has no legal move); everything else is command-shaped.
pub trait SearchEngine: Send {
    /// Reinitialize for a new game from the standard starting position.
    fn new_game(&mut self) -> Result<(), EngineError>;

    /// Synchronize the engine with a full FEN.
    fn set_position(&mut self, fen: &str) -> Result<(), EngineError>;

    /// The engine's own legal moves for the synchronized position, in
    /// coordinate notation.
    fn legal_moves(&mut self) -> Result<Vec<String>, EngineError>;

    /// Begin an asynchronous search. The result is delivered on the
    /// engine's result channel, from its own execution context.
    fn search(&mut self, limits: SearchLimits) -> Result<(), EngineError>;

    /// Apply a move (coordinate notation) to the synchronized position.
    fn play_move(&mut self, mv: &str) -> Result<(), EngineError>;

    /// Request cancellation of any in-flight search. Non-blocking, safe to
    /// call when idle; the engine observes it cooperatively.
    fn stop(&mut self);
}

/// Bridges the rule engine to an external search engine: position sync via
/// FEN, difficulty-tiered search limits, and translation of raw results
/// into `FullMove`s. There is exactly one of these per game session by
/// ownership; nothing here is global.
pub struct Bot {
    engine: Box<dyn SearchEngine>,
    results: Receiver<Option<EngineMove>>,
    difficulty: i32,
}

impl Bot {
    pub fn new(engine: Box<dyn SearchEngine>, results: Receiver<Option<EngineMove>>) -> Self {
        Self {
            engine,
            results,
            difficulty: DEFAULT_DIFFICULTY,
        }
    }

    pub fn difficulty(&self) -> i32 {
        self.difficulty
    }

    /// Out-of-range levels are clamped, not rejected.
    pub fn set_difficulty(&mut self, level: i32) {
        self.difficulty = clamp_difficulty(level);
        debug!("difficulty set to {}", self.difficulty);
    }

    /// Reinitialize the engine to the starting position. Only call when no
    /// search is outstanding.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.engine.new_game()?;
        self.engine.set_position(fen::START_FEN)
    }

    /// Hand the current position to the engine and start a search. The
    /// resulting move arrives later via `poll`/`recv_timeout`.
    pub fn on_player_move(&mut self, state: &BoardState) -> Result<(), EngineError> {
        let fen = state.fen();
        debug!("search from {}", fen);
        self.engine.set_position(&fen)?;
        self.engine.search(limits_for_difficulty(self.difficulty))
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Send a rule-engine move to the engine. The move is matched against
    /// the engine's own legal-move list first; a miss means the two sides
    /// disagree about the position, so the move is dropped with a
    /// diagnostic instead of desynchronizing the engine further. Returns
    /// whether the move was accepted.
    pub fn submit_move(&mut self, mv: &FullMove) -> Result<bool, EngineError> {
        let text = mv.to_string();
        let known = self.engine.legal_moves()?;
        if !known.iter().any(|m| m == &text) {
            warn!("engine does not recognize {}, dropping", text);
            return Ok(false);
        }
        self.engine.play_move(&text)?;
        Ok(true)
    }

    /// A translated engine result, if one has arrived.
    pub fn poll(&self) -> Option<SearchOutcome> {
        self.results.try_recv().ok().map(outcome)
    }

    /// Block up to `timeout` for a result. `None` means nothing arrived in
    /// time; an engine with no legal move still answers, with `NoMove`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SearchOutcome> {
        self.results.recv_timeout(timeout).ok().map(outcome)
    }
}

fn outcome(raw: Option<EngineMove>) -> SearchOutcome {
    match raw {
        Some(mv) => SearchOutcome::Move(translate(mv)),
        None => SearchOutcome::NoMove,
    }
}

// Normalize a raw engine move into the rule engine's conventions: castling
// may arrive as "king captures its own rook", which becomes the
// two-squares-over king destination; a promotion piece type only counts
// when the move is flagged as a promotion.
fn translate(raw: EngineMove) -> FullMove {
    let mut to = raw.to;
    if raw.kind == EngineMoveKind::Castling {
        let file = if raw.from.file() > raw.to.file() {
            raw.from.file() - 2
        } else {
            raw.from.file() + 2
        };
        to = Square::new(file, raw.from.rank()).unwrap_or(raw.to);
    }
    let promotion = if raw.kind == EngineMoveKind::Promotion {
        raw.promotion
    } else {
        None
    };
    FullMove {
        from: raw.from,
        to,
        promotion,
    }
}

/// An in-process fallback backend: answers every search with a uniformly
/// random legal move. Useful when no engine binary is around, and as the
/// reference double in tests.
pub struct RandomEngine {
    game: Game,
    tx: Sender<Option<EngineMove>>,
}

impl RandomEngine {
    pub fn new() -> (Self, Receiver<Option<EngineMove>>) {
        let (tx, rx) = unbounded();
        (
            Self {
                game: Game::new(),
                tx,
            },
            rx,
        )
    }

    fn candidates(&self) -> Vec<(Square, movegen::Move)> {
        let state = self.game.state();
        let side = state.side_to_move();
        let mut out = Vec::new();
        for from in Square::all() {
            match state.board().at(from) {
                Some(piece) if piece.side == side => {}
                _ => continue,
            }
            for mv in movegen::legal_moves(state, from) {
                out.push((from, mv));
            }
        }
        out
    }
}

impl SearchEngine for RandomEngine {
    fn new_game(&mut self) -> Result<(), EngineError> {
        self.game.reset();
        Ok(())
    }

    fn set_position(&mut self, fen: &str) -> Result<(), EngineError> {
        self.game = Game::from_fen(fen).map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(())
    }

    fn legal_moves(&mut self) -> Result<Vec<String>, EngineError> {
        let mut out = Vec::new();
        for (from, mv) in self.candidates() {
            let mut full = FullMove::new(from, mv.to);
            if mv.kind == MoveKind::Promotion {
                for kind in [
                    PromotionKind::Queen,
                    PromotionKind::Rook,
                    PromotionKind::Bishop,
                    PromotionKind::Knight,
                ] {
                    full.promotion = Some(kind);
                    out.push(full.to_string());
                }
            } else {
                out.push(full.to_string());
            }
        }
        Ok(out)
    }

    fn search(&mut self, _limits: SearchLimits) -> Result<(), EngineError> {
        let candidates = self.candidates();
        let (from, mv) = match candidates.choose(&mut rand::thread_rng()) {
            Some(c) => *c,
            None => {
                let _ = self.tx.send(None);
                return Ok(());
            }
        };
        let (kind, promotion) = match mv.kind {
            MoveKind::Promotion => (EngineMoveKind::Promotion, Some(PromotionKind::Queen)),
            MoveKind::EnPassant => (EngineMoveKind::EnPassant, None),
            MoveKind::KingsideCastle | MoveKind::QueensideCastle => {
                (EngineMoveKind::Castling, None)
            }
            _ => (EngineMoveKind::Normal, None),
        };
        let _ = self.tx.send(Some(EngineMove {
            from,
            to: mv.to,
            promotion,
            kind,
        }));
        Ok(())
    }

    fn play_move(&mut self, mv: &str) -> Result<(), EngineError> {
        let full = FullMove::parse(mv)
            .ok_or_else(|| EngineError::Protocol(format!("bad move string {}", mv)))?;
        self.game.apply_external_move(full);
        Ok(())
    }

    fn stop(&mut self) {}
}
