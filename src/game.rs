use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};

use crate::board::{PerSide, Piece, PieceKind, Position, PromotionKind, Side, Square};
use crate::fen::{self, FenError};
use crate::movegen::{self, FullMove, MoveKind};
use crate::state::{BoardState, TerminalState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    FiftyMoveRule,
    ThreefoldRepetition,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DrawReason::FiftyMoveRule => write!(f, "Fifty-move rule"),
            DrawReason::ThreefoldRepetition => write!(f, "Threefold repetition"),
        }
    }
}

/// What a finalized (or deferred) move produced. Drained with
/// `Game::take_events` by whatever is driving the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    MoveExecuted(FullMove),
    /// A pawn reached the back rank; the game waits for
    /// `resolve_promotion` before finalizing.
    PromotionRequired(Side),
    Checkmate { mv: FullMove, winner: Side },
    Stalemate { mv: FullMove, side: Side },
    Draw { mv: FullMove, reason: DrawReason },
}

/// The game controller: owns the position, validates and executes moves,
/// runs the promotion two-phase commit and keeps the draw bookkeeping.
pub struct Game {
    position: Position,
    state: BoardState,
    // Fingerprint -> occurrence count, for threefold repetition.
    repetition: HashMap<String, u32>,
    captured: PerSide<Vec<Piece>>,
    moves: Vec<FullMove>,
    pending_promotion: Option<FullMove>,
    events: Vec<GameEvent>,
}

impl Game {
    pub fn new() -> Self {
        let position = Position::standard();
        let state = BoardState::new(&position);
        Self {
            position,
            state,
            repetition: HashMap::new(),
            captured: PerSide::default(),
            moves: Vec::new(),
            pending_promotion: None,
            events: Vec::new(),
        }
    }

    /// Start a game from an arbitrary position. Handy for analysis and
    /// for engine backends that track their own game copy.
    pub fn from_fen(s: &str) -> Result<Self, FenError> {
        let state = fen::parse_fen(s)?;
        Ok(Self {
            position: state.board().clone(),
            state,
            repetition: HashMap::new(),
            captured: PerSide::default(),
            moves: Vec::new(),
            pending_promotion: None,
            events: Vec::new(),
        })
    }

    pub fn reset(&mut self) {
        *self = Game::new();
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn side_to_move(&self) -> Side {
        self.state.side_to_move()
    }

    pub fn is_in_check(&self, side: Side) -> bool {
        self.state.is_in_check(side)
    }

    pub fn captured_pieces(&self, side: Side) -> &[Piece] {
        &self.captured[side]
    }

    pub fn move_history(&self) -> &[FullMove] {
        &self.moves
    }

    /// The side whose promotion choice the game is waiting for, if any.
    pub fn awaiting_promotion(&self) -> Option<Side> {
        self.pending_promotion.map(|_| self.state.side_to_move())
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Validate and execute a move. Returns false when there is no piece at
    /// `from`, the piece belongs to the side not on turn, or `to` is not
    /// among its legal destinations; no distinction between the rejection
    /// reasons is surfaced. Returns true for every accepted move, promotion
    /// included (its finalization is merely deferred).
    pub fn try_move(&mut self, from: Square, to: Square) -> bool {
        self.try_move_inner(from, to, true)
    }

    fn try_move_inner(&mut self, from: Square, to: Square, prompt_promotion: bool) -> bool {
        let piece = match self.position.at(from) {
            Some(p) => p,
            None => return false,
        };
        if piece.side != self.state.side_to_move() {
            return false;
        }
        let matched = match movegen::legal_moves(&self.state, from)
            .into_iter()
            .find(|m| m.to == to)
        {
            Some(m) => m,
            None => return false,
        };

        let mv = FullMove::new(from, to);
        debug!("executing {} ({:?})", mv, matched.kind);

        if piece.kind == PieceKind::Pawn {
            self.state.half_move_clock = 0;
        }
        if matched.kind != MoveKind::EnPassant {
            self.state.en_passant_target = None;
        }

        // Type-specific side effects, applied before the piece moves.
        match matched.kind {
            MoveKind::DoubleAdvance => {
                self.state.en_passant_target = Some(to);
            }
            MoveKind::EnPassant => {
                // The captured pawn sits on the target square itself, not
                // on the capture destination. Consuming the target clears
                // it, so it is usable exactly once.
                let target = self
                    .state
                    .en_passant_target
                    .take()
                    .expect("en passant move generated without a target");
                self.capture_at(target);
            }
            MoveKind::KingsideCastle => {
                let rook_from = Square::from_index((from.rank() * 8 + 7) as usize);
                if let Some(rook_to) = from.offset(1, 0) {
                    self.relocate(rook_from, rook_to);
                }
            }
            MoveKind::QueensideCastle => {
                let rook_from = Square::from_index((from.rank() * 8) as usize);
                if let Some(rook_to) = from.offset(-1, 0) {
                    self.relocate(rook_from, rook_to);
                }
            }
            MoveKind::Promotion => {
                self.pending_promotion = Some(mv);
                if prompt_promotion {
                    self.events
                        .push(GameEvent::PromotionRequired(self.state.side_to_move()));
                }
            }
            MoveKind::Normal => {}
        }

        self.relocate(from, to);

        if matched.kind != MoveKind::Promotion {
            self.finalize(mv);
        }
        true
    }

    /// Second phase of a promotion: replace the pawn that already reached
    /// the back rank and finalize the deferred move. Calling this with no
    /// promotion pending is a protocol violation and panics.
    pub fn resolve_promotion(&mut self, side: Side, kind: PromotionKind) {
        let mut mv = self
            .pending_promotion
            .take()
            .expect("resolve_promotion called with no promotion pending");
        self.position
            .set(mv.to, Some(Piece::new(kind.piece_kind(), side)));
        mv.promotion = Some(kind);
        self.finalize(mv);
    }

    /// Execute a move coming from an external source such as the engine
    /// adapter. If the exact squares are rejected (a representation
    /// mismatch, not a rules question), fall back to the first legal move
    /// available to the side on turn so the game keeps making progress.
    /// A supplied promotion kind is applied immediately; no prompt event
    /// is emitted on this path.
    pub fn apply_external_move(&mut self, mv: FullMove) {
        if !self.try_move_inner(mv.from, mv.to, false) {
            warn!(
                "external move {} does not match any legal move, playing first valid move",
                mv
            );
            self.play_first_valid();
        }
        if self.pending_promotion.is_some() {
            let side = self.state.side_to_move();
            match mv.promotion {
                Some(kind) => self.resolve_promotion(side, kind),
                // The source omitted the kind; promote to queen rather
                // than leaving the game stuck mid-commit.
                None => {
                    warn!("external promotion without a piece kind, promoting to queen");
                    self.resolve_promotion(side, PromotionKind::Queen);
                }
            }
        }
    }

    fn play_first_valid(&mut self) {
        for from in Square::all() {
            match self.position.at(from) {
                Some(piece) if piece.side == self.state.side_to_move() => {}
                _ => continue,
            }
            let moves = movegen::legal_moves(&self.state, from);
            if let Some(first) = moves.first() {
                if self.try_move_inner(from, first.to, false) {
                    return;
                }
            }
        }
        warn!("no legal move available for fallback");
    }

    // Shared tail of the normal path and the promotion commit: rederive
    // state, evaluate terminal and draw conditions, record history and
    // hand the turn over.
    fn finalize(&mut self, mv: FullMove) {
        self.state.update(&self.position);

        for side in [Side::White, Side::Black] {
            if !self.state.is_in_check(side) {
                continue;
            }
            match self.state.evaluate_terminal(side) {
                TerminalState::Win => self.events.push(GameEvent::Checkmate {
                    mv,
                    winner: side.opposite(),
                }),
                // Only checked sides are visited, and evaluate_terminal
                // reports Stalemate only for a side not in check, so this
                // arm never fires: a stalemated opponent keeps playing
                // until a draw rule ends the game. Intentional; see
                // DESIGN.md.
                TerminalState::Stalemate => {
                    self.events.push(GameEvent::Stalemate { mv, side })
                }
                TerminalState::Continue => {}
            }
        }

        // 50 full moves without a capture or pawn advance.
        if self.state.half_move_clock() >= 100 {
            self.events.push(GameEvent::Draw {
                mv,
                reason: DrawReason::FiftyMoveRule,
            });
        }

        let count = self
            .repetition
            .entry(self.state.fingerprint())
            .or_insert(0);
        *count += 1;
        if *count == 3 {
            self.events.push(GameEvent::Draw {
                mv,
                reason: DrawReason::ThreefoldRepetition,
            });
        }

        self.moves.push(mv);
        self.state.advance_turn();
        self.events.push(GameEvent::MoveExecuted(mv));
    }

    // Move a piece, capturing whatever stood on the destination first.
    fn relocate(&mut self, from: Square, to: Square) {
        self.capture_at(to);
        if let Some(mut piece) = self.position.take(from) {
            piece.has_moved = true;
            self.position.set(to, Some(piece));
        }
    }

    fn capture_at(&mut self, sq: Square) {
        if let Some(piece) = self.position.take(sq) {
            self.state.half_move_clock = 0;
            self.captured[piece.side].push(piece);
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Game::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    fn play(game: &mut Game, from: &str, to: &str) {
        assert!(game.try_move(sq(from), sq(to)), "{}{} rejected", from, to);
    }

    #[test]
    fn test_opening_scenario() {
        let mut game = Game::new();

        // White plays e2-e4; the turn passes to Black.
        assert!(game.try_move(sq("e2"), sq("e4")));
        assert_eq!(game.side_to_move(), Side::Black);

        // No piece on e3: rejected, still Black's turn.
        assert!(!game.try_move(sq("e3"), sq("e4")));
        assert_eq!(game.side_to_move(), Side::Black);

        // Black replies e7-e5.
        assert!(game.try_move(sq("e7"), sq("e5")));
        assert_eq!(game.side_to_move(), Side::White);

        assert_eq!(game.move_history().len(), 2);
    }

    #[test]
    fn test_wrong_side_rejected() {
        let mut game = Game::new();
        assert!(!game.try_move(sq("e7"), sq("e5")));
        assert_eq!(game.side_to_move(), Side::White);
    }

    #[test]
    fn test_capture_order_is_preserved() {
        let mut game = Game::new();
        play(&mut game, "e2", "e4");
        play(&mut game, "d7", "d5");
        play(&mut game, "e4", "d5");
        play(&mut game, "d8", "d5");

        let black_lost = game.captured_pieces(Side::Black);
        assert_eq!(black_lost.len(), 1);
        assert_eq!(black_lost[0].kind, PieceKind::Pawn);
        let white_lost = game.captured_pieces(Side::White);
        assert_eq!(white_lost.len(), 1);
        assert_eq!(white_lost[0].kind, PieceKind::Pawn);
    }

    #[test]
    fn test_en_passant_capture_removes_actual_pawn() {
        let mut game = Game::new();
        play(&mut game, "e2", "e4");
        play(&mut game, "a7", "a6");
        play(&mut game, "e4", "e5");
        play(&mut game, "d7", "d5");
        assert_eq!(game.state().en_passant_target(), Some(sq("d5")));

        play(&mut game, "e5", "d6");
        assert!(game.position().at(sq("d5")).is_none());
        assert_eq!(
            game.position().at(sq("d6")).unwrap().kind,
            PieceKind::Pawn
        );
        assert_eq!(game.captured_pieces(Side::Black).len(), 1);
        assert_eq!(game.state().en_passant_target(), None);
    }

    #[test]
    fn test_en_passant_target_cleared_when_unused() {
        let mut game = Game::new();
        play(&mut game, "e2", "e4");
        assert_eq!(game.state().en_passant_target(), Some(sq("e4")));
        play(&mut game, "g8", "f6");
        assert_eq!(game.state().en_passant_target(), None);
    }

    #[test]
    fn test_castling_moves_the_rook_too() {
        let mut game = Game::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        play(&mut game, "e1", "g1");
        assert_eq!(game.position().at(sq("g1")).unwrap().kind, PieceKind::King);
        assert_eq!(game.position().at(sq("f1")).unwrap().kind, PieceKind::Rook);
        assert!(game.position().at(sq("h1")).is_none());

        play(&mut game, "e8", "c8");
        assert_eq!(game.position().at(sq("c8")).unwrap().kind, PieceKind::King);
        assert_eq!(game.position().at(sq("d8")).unwrap().kind, PieceKind::Rook);
        assert!(game.position().at(sq("a8")).is_none());
    }

    #[test]
    fn test_promotion_two_phase_commit() {
        for kind in [
            PromotionKind::Queen,
            PromotionKind::Rook,
            PromotionKind::Bishop,
            PromotionKind::Knight,
        ] {
            let mut game = Game::from_fen("6k1/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
            assert!(game.try_move(sq("a7"), sq("a8")));

            // Relocated but not finalized: prompt emitted, turn not yet
            // handed over, no MoveExecuted.
            assert_eq!(game.awaiting_promotion(), Some(Side::White));
            assert_eq!(game.side_to_move(), Side::White);
            let events = game.take_events();
            assert_eq!(events, vec![GameEvent::PromotionRequired(Side::White)]);
            assert_eq!(game.move_history().len(), 0);

            game.resolve_promotion(Side::White, kind);
            assert_eq!(game.awaiting_promotion(), None);
            assert_eq!(game.side_to_move(), Side::Black);
            assert_eq!(
                game.position().at(sq("a8")).unwrap().kind,
                kind.piece_kind()
            );
            let events = game.take_events();
            let expected = FullMove {
                from: sq("a7"),
                to: sq("a8"),
                promotion: Some(kind),
            };
            assert!(events.contains(&GameEvent::MoveExecuted(expected)));
        }
    }

    #[test]
    #[should_panic(expected = "no promotion pending")]
    fn test_resolve_promotion_without_pending_panics() {
        let mut game = Game::new();
        game.resolve_promotion(Side::White, PromotionKind::Queen);
    }

    #[test]
    fn test_promotion_can_deliver_checkmate_only_after_resolution() {
        // Back-rank promotion: the new queen mates the boxed-in king.
        let mut game = Game::from_fen("6k1/1P3ppp/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        assert!(game.try_move(sq("b7"), sq("b8")));
        assert!(game
            .take_events()
            .iter()
            .all(|e| matches!(e, GameEvent::PromotionRequired(_))));

        game.resolve_promotion(Side::White, PromotionKind::Queen);
        let events = game.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Checkmate { winner: Side::White, .. })));
    }

    #[test]
    fn test_stalemate_goes_unreported_on_the_move_path() {
        // Qg5-g6 stalemates Black: not in check, nothing to play. The
        // state classifies it, but finalize only examines checked sides,
        // so no event is emitted and the game stays open.
        let mut game = Game::from_fen("7k/8/7K/6Q1/8/8/8/8 w - - 0 1").unwrap();
        play(&mut game, "g5", "g6");

        assert!(!game.is_in_check(Side::Black));
        assert_eq!(
            game.state().evaluate_terminal(Side::Black),
            TerminalState::Stalemate
        );
        let events = game.take_events();
        assert!(events
            .iter()
            .all(|e| matches!(e, GameEvent::MoveExecuted(_))));
    }

    #[test]
    fn test_fifty_move_rule_draw() {
        let mut game = Game::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 60").unwrap();
        play(&mut game, "a1", "a2");
        let events = game.take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::Draw {
                reason: DrawReason::FiftyMoveRule,
                ..
            }
        )));
    }

    #[test]
    fn test_capture_resets_fifty_move_clock() {
        let mut game = Game::from_fen("4k3/8/8/8/8/8/r7/R3K3 w - - 99 60").unwrap();
        play(&mut game, "a1", "a2");
        assert!(game.take_events().iter().all(|e| !matches!(
            e,
            GameEvent::Draw {
                reason: DrawReason::FiftyMoveRule,
                ..
            }
        )));
        // The capture zeroed the clock before the post-move increment.
        assert_eq!(game.state().half_move_clock(), 1);
    }

    #[test]
    fn test_threefold_repetition_signaled_exactly_once() {
        let mut game = Game::new();
        let shuffle = [
            ("g1", "f3"),
            ("g8", "f6"),
            ("f3", "g1"),
            ("f6", "g8"),
        ];
        // Knight shuffles revisit the same four fingerprints each cycle,
        // so every position of the cycle reaches its third occurrence
        // during the third cycle and its fourth during the extra move.
        let mut draws_at_move = Vec::new();
        for _ in 0..3 {
            for (from, to) in shuffle {
                play(&mut game, from, to);
                let draws = game
                    .take_events()
                    .iter()
                    .filter(|e| {
                        matches!(
                            e,
                            GameEvent::Draw {
                                reason: DrawReason::ThreefoldRepetition,
                                ..
                            }
                        )
                    })
                    .count();
                draws_at_move.push(draws);
            }
        }
        // First two cycles: first and second occurrences, never a signal.
        assert!(draws_at_move[..8].iter().all(|&d| d == 0));
        // Third cycle: each move produces a third occurrence, one signal each.
        assert!(draws_at_move[8..].iter().all(|&d| d == 1));

        // A fourth occurrence stays silent.
        play(&mut game, "g1", "f3");
        assert!(game.take_events().iter().all(|e| !matches!(
            e,
            GameEvent::Draw {
                reason: DrawReason::ThreefoldRepetition,
                ..
            }
        )));
    }

    #[test]
    fn test_apply_external_move_exact() {
        let mut game = Game::new();
        game.apply_external_move(FullMove::parse("e2e4").unwrap());
        assert_eq!(game.side_to_move(), Side::Black);
        assert!(game.position().at(sq("e4")).is_some());
    }

    #[test]
    fn test_apply_external_move_falls_back_to_first_valid() {
        let mut game = Game::new();
        // Nothing stands on e5, so the exact move cannot match.
        game.apply_external_move(FullMove::parse("e5e6").unwrap());
        assert_eq!(game.side_to_move(), Side::Black);
        assert_eq!(game.move_history().len(), 1);
    }

    #[test]
    fn test_apply_external_promotion_resolves_immediately() {
        let mut game = Game::from_fen("6k1/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        game.apply_external_move(FullMove::parse("a7a8q").unwrap());
        assert_eq!(game.awaiting_promotion(), None);
        assert_eq!(
            game.position().at(sq("a8")).unwrap().kind,
            PieceKind::Queen
        );
        // The prompt is suppressed on the external path.
        assert!(game
            .take_events()
            .iter()
            .all(|e| !matches!(e, GameEvent::PromotionRequired(_))));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut game = Game::new();
        play(&mut game, "e2", "e4");
        play(&mut game, "d7", "d5");
        play(&mut game, "e4", "d5");
        game.reset();
        assert_eq!(game.move_history().len(), 0);
        assert_eq!(game.captured_pieces(Side::Black).len(), 0);
        assert_eq!(game.side_to_move(), Side::White);
        assert_eq!(game.state().fingerprint(), fen::START_FINGERPRINT);
    }
}
