use thiserror::Error;

use crate::board::{Piece, PieceKind, Position, Side, Square};
use crate::state::BoardState;

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// The starting position's repetition key: FEN without the two counters.
pub const START_FINGERPRINT: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -";

#[derive(Debug, Error)]
pub enum FenError {
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("unexpected piece letter '{0}'")]
    BadPiece(char),
    #[error("bad board layout: {0}")]
    BadLayout(&'static str),
    #[error("bad side-to-move field '{0}'")]
    BadSide(String),
    #[error("bad castling field character '{0}'")]
    BadCastling(char),
    #[error("bad square '{0}'")]
    BadSquare(String),
    #[error("bad counter '{0}'")]
    BadCounter(String),
}

/// Full positional encoding: layout, side, castling, en-passant target,
/// half-move clock and full-move counter. This is what the external engine
/// is synchronized with.
pub fn write_fen(state: &BoardState) -> String {
    format!(
        "{} {} {}",
        write_fingerprint(state),
        state.half_move_clock(),
        state.full_move_counter()
    )
}

/// Like `write_fen` but without the counters. Used only as the
/// repetition-detection key, never exchanged externally.
pub fn write_fingerprint(state: &BoardState) -> String {
    let mut out = String::new();
    write_layout(state.board(), &mut out);

    out.push(' ');
    out.push(match state.side_to_move() {
        Side::White => 'w',
        Side::Black => 'b',
    });

    out.push(' ');
    write_castling(state.board(), &mut out);

    out.push(' ');
    match state.en_passant_target() {
        Some(sq) => out.push_str(&sq.to_string()),
        None => out.push('-'),
    }
    out
}

fn write_layout(board: &Position, out: &mut String) {
    for rank in (0..8).rev() {
        let mut empty_run = 0;
        for file in 0..8 {
            let sq = Square::from_index(rank * 8 + file);
            match board.at(sq) {
                Some(piece) => {
                    if empty_run != 0 {
                        out.push((b'0' + empty_run) as char);
                        empty_run = 0;
                    }
                    out.push(piece.letter());
                }
                None => empty_run += 1,
            }
        }
        if empty_run != 0 {
            out.push((b'0' + empty_run) as char);
        }
        if rank != 0 {
            out.push('/');
        }
    }
}

// Castling rights are derived from the has-moved flags of the king on its
// home square and the rooks on their corners. A single '-' stands in when
// neither side has any right left.
fn write_castling(board: &Position, out: &mut String) {
    let mut any = false;
    let sides = [(Side::White, 'K', 'Q'), (Side::Black, 'k', 'q')];
    for (side, kingside, queenside) in sides {
        let rank = side.home_rank();
        if !king_can_castle(board, rank) {
            continue;
        }
        for (file, letter) in [(7, kingside), (0, queenside)] {
            if rook_can_castle(board, file, rank) {
                out.push(letter);
                any = true;
            }
        }
    }
    if !any {
        out.push('-');
    }
}

fn king_can_castle(board: &Position, rank: i8) -> bool {
    let sq = Square::from_index((rank * 8 + 4) as usize);
    matches!(board.at(sq), Some(p) if p.kind == PieceKind::King && !p.has_moved)
}

fn rook_can_castle(board: &Position, file: i8, rank: i8) -> bool {
    let sq = Square::from_index((rank * 8 + file) as usize);
    matches!(board.at(sq), Some(p) if p.kind == PieceKind::Rook && !p.has_moved)
}

/// Parse a FEN string, or a fingerprint (the two counters may be omitted
/// and default to 0 and 1). Castling rights and pawn ranks are folded back
/// into per-piece has-moved flags.
pub fn parse_fen(s: &str) -> Result<BoardState, FenError> {
    let mut fields = s.split_whitespace();

    let layout = fields.next().ok_or(FenError::MissingField("board"))?;
    let mut position = parse_layout(layout)?;

    let side = match fields.next().ok_or(FenError::MissingField("side"))? {
        "w" => Side::White,
        "b" => Side::Black,
        other => return Err(FenError::BadSide(other.to_string())),
    };

    let castling = fields.next().ok_or(FenError::MissingField("castling"))?;
    apply_castling(&mut position, castling)?;

    let ep_field = fields.next().ok_or(FenError::MissingField("en passant"))?;
    let en_passant_target = if ep_field == "-" {
        None
    } else {
        Some(Square::parse(ep_field).ok_or_else(|| FenError::BadSquare(ep_field.to_string()))?)
    };

    let half_move_clock = parse_counter(fields.next(), 0)?;
    let full_move_counter = parse_counter(fields.next(), 1)?;

    Ok(BoardState::from_parts(
        position,
        side,
        en_passant_target,
        half_move_clock,
        full_move_counter,
    ))
}

fn parse_layout(layout: &str) -> Result<Position, FenError> {
    let mut position = Position::empty();
    let mut rank: i8 = 7;
    let mut file: i8 = 0;
    for c in layout.chars() {
        match c {
            '/' => {
                rank -= 1;
                file = 0;
                if rank < 0 {
                    return Err(FenError::BadLayout("too many ranks"));
                }
            }
            '1'..='8' => file += c as i8 - '0' as i8,
            _ => {
                let kind = PieceKind::from_letter(c).ok_or(FenError::BadPiece(c))?;
                let side = if c.is_ascii_uppercase() {
                    Side::White
                } else {
                    Side::Black
                };
                let sq = Square::new(file, rank).ok_or(FenError::BadLayout("rank overflow"))?;
                let mut piece = Piece::new(kind, side);
                piece.has_moved = match kind {
                    // Pawns off their starting rank have necessarily moved.
                    PieceKind::Pawn => rank != side.pawn_rank(),
                    // Assume moved until a castling right says otherwise.
                    PieceKind::King | PieceKind::Rook => true,
                    _ => false,
                };
                position.set(sq, Some(piece));
                file += 1;
            }
        }
    }
    Ok(position)
}

fn apply_castling(position: &mut Position, field: &str) -> Result<(), FenError> {
    if field == "-" {
        return Ok(());
    }
    for c in field.chars() {
        let (rank, rook_file) = match c {
            'K' => (0, 7),
            'Q' => (0, 0),
            'k' => (7, 7),
            'q' => (7, 0),
            _ => return Err(FenError::BadCastling(c)),
        };
        mark_unmoved(position, Square::from_index(rank * 8 + 4));
        mark_unmoved(position, Square::from_index(rank * 8 + rook_file));
    }
    Ok(())
}

fn mark_unmoved(position: &mut Position, sq: Square) {
    if let Some(mut piece) = position.at(sq) {
        piece.has_moved = false;
        position.set(sq, Some(piece));
    }
}

fn parse_counter(field: Option<&str>, default: u32) -> Result<u32, FenError> {
    match field {
        Some(text) => text
            .parse()
            .map_err(|_| FenError::BadCounter(text.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Position;

    #[test]
    fn test_start_position_encoding() {
        let state = BoardState::new(&Position::standard());
        assert_eq!(state.fen(), START_FEN);
        assert_eq!(state.fingerprint(), START_FINGERPRINT);
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let fens = [
            START_FEN,
            "4k3/8/8/3Pp3/8/8/8/4K3 w - e5 0 12",
            "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R b KQkq - 4 9",
            "8/8/8/8/8/6QK/8/7k b - - 31 77",
        ];
        for fen in fens {
            let once = parse_fen(fen).unwrap().fen();
            let twice = parse_fen(&once).unwrap().fen();
            assert_eq!(once, fen);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_fingerprint_round_trip() {
        let state = parse_fen(START_FINGERPRINT).unwrap();
        assert_eq!(state.half_move_clock(), 0);
        assert_eq!(state.full_move_counter(), 1);
        assert_eq!(state.fingerprint(), START_FINGERPRINT);
    }

    #[test]
    fn test_castling_rights_follow_has_moved() {
        let state = parse_fen("r3k2r/8/8/8/8/8/8/R3K2R w Kq - 0 1").unwrap();
        let board = state.board();
        let h1 = Square::parse("h1").unwrap();
        let a1 = Square::parse("a1").unwrap();
        assert!(!board.at(h1).unwrap().has_moved);
        assert!(board.at(a1).unwrap().has_moved);
        assert_eq!(state.fingerprint(), "r3k2r/8/8/8/8/8/8/R3K2R w Kq -");
    }

    #[test]
    fn test_no_castling_collapses_to_dash() {
        let state = parse_fen("r3k2r/8/8/8/8/8/8/R3K2R w - - 0 1").unwrap();
        assert_eq!(state.fingerprint(), "r3k2r/8/8/8/8/8/8/R3K2R w - -");
    }

    #[test]
    fn test_pawn_rank_rule() {
        let state = parse_fen("4k3/8/8/8/8/4P3/3P4/4K3 w - - 0 1").unwrap();
        let e3 = Square::parse("e3").unwrap();
        let d2 = Square::parse("d2").unwrap();
        assert!(state.board().at(e3).unwrap().has_moved);
        assert!(!state.board().at(d2).unwrap().has_moved);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR"),
            Err(FenError::MissingField("side"))
        ));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq -"),
            Err(FenError::BadSide(_))
        ));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KXkq -"),
            Err(FenError::BadCastling('X'))
        ));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e9"),
            Err(FenError::BadSquare(_))
        ));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - x 1"),
            Err(FenError::BadCounter(_))
        ));
        assert!(matches!(
            parse_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNZ w KQkq -"),
            Err(FenError::BadPiece('Z'))
        ));
    }
}
