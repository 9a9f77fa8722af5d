use crate::board::{PerSide, PieceKind, Position, Side, Square};
use crate::fen;
use crate::movegen::{self, Move};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Continue,
    // The side under test is checkmated; the other side wins.
    Win,
    Stalemate,
}

/// Derived snapshot of the position: king squares, check flags, the
/// en-passant target and the move counters. Everything here is recomputed
/// from the grid rather than tracked incrementally; the board is fixed at
/// 8x8 so a full rescan stays cheap.
#[derive(Debug, Clone)]
pub struct BoardState {
    board: Position,
    in_check: PerSide<bool>,
    king_square: PerSide<Square>,
    // Set to the landing square of a pawn double-advance, for one ply only.
    pub(crate) en_passant_target: Option<Square>,
    // Moves since the last capture or pawn advance, for the fifty-move rule.
    pub(crate) half_move_clock: u32,
    // Starts at 1, incremented after Black's move.
    full_move_counter: u32,
    side_to_move: Side,
}

impl BoardState {
    pub fn new(position: &Position) -> Self {
        let mut state = Self {
            board: position.clone(),
            in_check: PerSide::new(false),
            king_square: PerSide::new(Square::from_index(4)),
            en_passant_target: None,
            half_move_clock: 0,
            full_move_counter: 1,
            side_to_move: Side::White,
        };
        state.recompute();
        state
    }

    pub(crate) fn from_parts(
        position: Position,
        side_to_move: Side,
        en_passant_target: Option<Square>,
        half_move_clock: u32,
        full_move_counter: u32,
    ) -> Self {
        let mut state = Self {
            board: position,
            in_check: PerSide::new(false),
            king_square: PerSide::new(Square::from_index(4)),
            en_passant_target,
            half_move_clock,
            full_move_counter,
            side_to_move,
        };
        state.recompute();
        state
    }

    pub fn board(&self) -> &Position {
        &self.board
    }

    pub fn is_in_check(&self, side: Side) -> bool {
        self.in_check[side]
    }

    pub fn king_square(&self, side: Side) -> Square {
        self.king_square[side]
    }

    pub fn en_passant_target(&self) -> Option<Square> {
        self.en_passant_target
    }

    pub fn half_move_clock(&self) -> u32 {
        self.half_move_clock
    }

    pub fn full_move_counter(&self) -> u32 {
        self.full_move_counter
    }

    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    pub fn fen(&self) -> String {
        fen::write_fen(self)
    }

    pub fn fingerprint(&self) -> String {
        fen::write_fingerprint(self)
    }

    /// Refresh the mirror of the grid and rederive the check flags.
    pub fn update(&mut self, position: &Position) {
        self.board = position.clone();
        self.recompute();
    }

    pub(crate) fn recompute(&mut self) {
        for sq in Square::all() {
            if let Some(piece) = self.board.at(sq) {
                if piece.kind == PieceKind::King {
                    self.king_square[piece.side] = sq;
                }
            }
        }

        let mut in_check = PerSide::new(false);
        let mut moves: Vec<Move> = Vec::new();
        for sq in Square::all() {
            let piece = match self.board.at(sq) {
                Some(p) => p,
                None => continue,
            };
            moves.clear();
            movegen::collect_pseudo_legal(self, sq, &mut moves);
            let enemy = piece.side.opposite();
            let enemy_king = self.king_square[enemy];
            if moves.iter().any(|m| m.to == enemy_king) {
                in_check[enemy] = true;
            }
        }
        self.in_check = in_check;
    }

    /// Simulate the move on a scratch copy and report whether the mover's
    /// own king ends up in check. This is the sole pin/self-check filter.
    pub fn move_leaves_in_check(&self, from: Square, to: Square) -> bool {
        let piece = self
            .board
            .at(from)
            .expect("move_leaves_in_check called on an empty square");

        let mut scratch = self.clone();
        let moved = scratch.board.take(from);
        scratch.board.set(to, moved);
        scratch.recompute();
        scratch.in_check[piece.side]
    }

    /// Whether `side` has any legal move left. With none, being in check
    /// means the opponent won, otherwise it is a stalemate.
    pub fn evaluate_terminal(&self, side: Side) -> TerminalState {
        for sq in Square::all() {
            match self.board.at(sq) {
                Some(piece) if piece.side == side => {}
                _ => continue,
            }
            if !movegen::legal_moves(self, sq).is_empty() {
                return TerminalState::Continue;
            }
        }
        if self.in_check[side] {
            TerminalState::Win
        } else {
            TerminalState::Stalemate
        }
    }

    pub(crate) fn advance_turn(&mut self) {
        self.half_move_clock += 1;
        if self.side_to_move == Side::Black {
            self.full_move_counter += 1;
        }
        self.side_to_move = self.side_to_move.opposite();
    }
}
