use std::fmt;

use crate::board::{Piece, PieceKind, PromotionKind, Side, Square};
use crate::state::BoardState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Normal,
    // A pawn moving two squares forward, exposing itself to en passant.
    DoubleAdvance,
    EnPassant,
    KingsideCastle,
    QueensideCastle,
    Promotion,
}

/// A candidate destination for one piece. The origin is implied by the
/// query that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub to: Square,
    pub kind: MoveKind,
}

/// A move with its origin spelled out, plus the chosen promotion piece once
/// one has been resolved. Formats as coordinate notation ("e2e4", "e7e8q").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<PromotionKind>,
}

impl FullMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn parse(s: &str) -> Option<FullMove> {
        if !s.is_ascii() || (s.len() != 4 && s.len() != 5) {
            return None;
        }
        let from = Square::parse(&s[0..2])?;
        let to = Square::parse(&s[2..4])?;
        let promotion = match s.chars().nth(4) {
            Some(c) => Some(PromotionKind::from_letter(c)?),
            None => None,
        };
        Some(FullMove {
            from,
            to,
            promotion,
        })
    }
}

impl fmt::Display for FullMove {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.letter())?;
        }
        Ok(())
    }
}

/// Legal destinations for the piece on `from`: pseudo-legal generation
/// followed by the self-check filter. This is the only query callers
/// should use to drive play.
pub fn legal_moves(state: &BoardState, from: Square) -> Vec<Move> {
    let mut moves = pseudo_legal_moves(state, from);
    moves.retain(|m| !state.move_leaves_in_check(from, m.to));
    moves
}

/// Destinations obeying the piece's movement pattern and board occupancy,
/// without regard for the mover's own king.
pub fn pseudo_legal_moves(state: &BoardState, from: Square) -> Vec<Move> {
    let mut moves = Vec::new();
    collect_pseudo_legal(state, from, &mut moves);
    moves
}

pub(crate) fn collect_pseudo_legal(state: &BoardState, from: Square, out: &mut Vec<Move>) {
    let piece = match state.board().at(from) {
        Some(p) => p,
        None => return,
    };
    let mut sink = MoveSink {
        state,
        out,
        from,
        side: piece.side,
    };
    match piece.kind {
        PieceKind::King => king_moves(&mut sink, piece),
        PieceKind::Queen => {
            sink.add_straight_rays();
            sink.add_diagonal_rays();
        }
        PieceKind::Rook => sink.add_straight_rays(),
        PieceKind::Bishop => sink.add_diagonal_rays(),
        PieceKind::Knight => knight_moves(&mut sink),
        PieceKind::Pawn => pawn_moves(&mut sink, piece),
    }
}

struct MoveSink<'a> {
    state: &'a BoardState,
    out: &'a mut Vec<Move>,
    from: Square,
    side: Side,
}

impl MoveSink<'_> {
    fn add(&mut self, to: Square, kind: MoveKind) {
        self.out.push(Move { to, kind });
    }

    // Adds the square unless it is off the board or holds a friendly piece.
    // Returns true when a ray walking through here should stop.
    fn try_add(&mut self, to: Option<Square>) -> bool {
        let to = match to {
            Some(sq) => sq,
            None => return true,
        };
        match self.state.board().at(to) {
            Some(piece) if piece.side == self.side => true,
            Some(_) => {
                self.add(to, MoveKind::Normal);
                true
            }
            None => {
                self.add(to, MoveKind::Normal);
                false
            }
        }
    }

    fn ray(&mut self, df: i8, dr: i8) {
        for i in 1..8 {
            if self.try_add(self.from.offset(df * i, dr * i)) {
                break;
            }
        }
    }

    fn add_straight_rays(&mut self) {
        self.ray(1, 0);
        self.ray(-1, 0);
        self.ray(0, 1);
        self.ray(0, -1);
    }

    fn add_diagonal_rays(&mut self) {
        self.ray(1, 1);
        self.ray(1, -1);
        self.ray(-1, 1);
        self.ray(-1, -1);
    }
}

fn king_moves(sink: &mut MoveSink, piece: Piece) {
    let steps = [
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];
    for (df, dr) in steps {
        sink.try_add(sink.from.offset(df, dr));
    }
    if !piece.has_moved {
        castle_moves(sink);
    }
}

// Castling: king never moved, the corner rook never moved, all squares
// strictly between them empty. The king's transit and destination squares
// are not tested for attack here; the self-check filter only rejects a
// castle whose final square is attacked.
fn castle_moves(sink: &mut MoveSink) {
    let from = sink.from;
    let rank = from.rank();
    let corners = [(7, MoveKind::KingsideCastle), (0, MoveKind::QueensideCastle)];
    for (corner, kind) in corners {
        let (lo, hi) = if corner > from.file() {
            (from.file() + 1, corner - 1)
        } else {
            (corner + 1, from.file() - 1)
        };
        let clear = (lo..=hi).all(|file| {
            let sq = Square::from_index((rank * 8 + file) as usize);
            sink.state.board().at(sq).is_none()
        });
        if !clear {
            continue;
        }
        let rook_sq = Square::from_index((rank * 8 + corner) as usize);
        match sink.state.board().at(rook_sq) {
            Some(p) if p.kind == PieceKind::Rook && !p.has_moved => {
                let step = if corner > from.file() { 2 } else { -2 };
                if let Some(to) = from.offset(step, 0) {
                    sink.add(to, kind);
                }
            }
            _ => {}
        }
    }
}

fn knight_moves(sink: &mut MoveSink) {
    let jumps = [
        (1, 2),
        (2, 1),
        (1, -2),
        (-2, 1),
        (-1, 2),
        (2, -1),
        (-1, -2),
        (-2, -1),
    ];
    for (df, dr) in jumps {
        sink.try_add(sink.from.offset(df, dr));
    }
}

fn pawn_moves(sink: &mut MoveSink, piece: Piece) {
    let sgn: i8 = match piece.side {
        Side::White => 1,
        Side::Black => -1,
    };
    let from = sink.from;

    // Forward pushes need an empty destination.
    let mut can_push = false;
    if let Some(sq) = from.offset(0, sgn) {
        if sink.state.board().at(sq).is_none() {
            add_pawn_move(sink, sq, MoveKind::Normal);
            can_push = true;
        }
    }
    if can_push && !piece.has_moved {
        if let Some(sq) = from.offset(0, 2 * sgn) {
            if sink.state.board().at(sq).is_none() {
                add_pawn_move(sink, sq, MoveKind::DoubleAdvance);
            }
        }
    }

    // Diagonal captures need an enemy on the destination.
    for df in [-1, 1] {
        if let Some(sq) = from.offset(df, sgn) {
            if let Some(other) = sink.state.board().at(sq) {
                if other.side != piece.side {
                    add_pawn_move(sink, sq, MoveKind::Normal);
                }
            }
        }
    }

    // En passant: the square beside us is the recorded target (the enemy
    // pawn's landing square); we capture one rank beyond it.
    for df in [-1, 1] {
        if let Some(beside) = from.offset(df, 0) {
            if sink.state.en_passant_target() == Some(beside) {
                if let Some(to) = from.offset(df, sgn) {
                    sink.add(to, MoveKind::EnPassant);
                }
            }
        }
    }
}

// Any pawn move landing on the farthest rank becomes a promotion, push or
// capture alike. An en-passant capture can never land there.
fn add_pawn_move(sink: &mut MoveSink, to: Square, kind: MoveKind) {
    if to.rank() == 0 || to.rank() == 7 {
        sink.add(to, MoveKind::Promotion);
    } else {
        sink.add(to, kind);
    }
}
