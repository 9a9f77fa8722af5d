use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White = 0,
    Black = 1,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn home_rank(&self) -> i8 {
        match self {
            Side::White => 0,
            Side::Black => 7,
        }
    }

    pub fn pawn_rank(&self) -> i8 {
        match self {
            Side::White => 1,
            Side::Black => 6,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

/// A pair of values indexed by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerSide<T>([T; 2]);

impl<T: Copy> PerSide<T> {
    pub fn new(value: T) -> Self {
        Self([value; 2])
    }
}

impl<T> Index<Side> for PerSide<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        &self.0[side as usize]
    }
}

impl<T> IndexMut<Side> for PerSide<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        &mut self.0[side as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    pub fn letter(&self) -> char {
        match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        }
    }

    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'k' => Some(PieceKind::King),
            'q' => Some(PieceKind::Queen),
            'r' => Some(PieceKind::Rook),
            'b' => Some(PieceKind::Bishop),
            'n' => Some(PieceKind::Knight),
            'p' => Some(PieceKind::Pawn),
            _ => None,
        }
    }
}

/// The four pieces a pawn may promote to. Absence of a promotion is an
/// `Option`, not a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionKind {
    Knight,
    Bishop,
    Rook,
    Queen,
}

impl PromotionKind {
    pub fn piece_kind(&self) -> PieceKind {
        match self {
            PromotionKind::Knight => PieceKind::Knight,
            PromotionKind::Bishop => PieceKind::Bishop,
            PromotionKind::Rook => PieceKind::Rook,
            PromotionKind::Queen => PieceKind::Queen,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            PromotionKind::Knight => 'n',
            PromotionKind::Bishop => 'b',
            PromotionKind::Rook => 'r',
            PromotionKind::Queen => 'q',
        }
    }

    pub fn from_letter(c: char) -> Option<PromotionKind> {
        match c {
            'n' => Some(PromotionKind::Knight),
            'b' => Some(PromotionKind::Bishop),
            'r' => Some(PromotionKind::Rook),
            'q' => Some(PromotionKind::Queen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub side: Side,
    // Drives castling eligibility for king/rook and double-advance for pawns.
    pub has_moved: bool,
}

impl Piece {
    pub fn new(kind: PieceKind, side: Side) -> Self {
        Self {
            kind,
            side,
            has_moved: false,
        }
    }

    pub fn letter(&self) -> char {
        let l = self.kind.letter();
        match self.side {
            Side::White => l.to_ascii_uppercase(),
            Side::Black => l,
        }
    }
}

/// A board coordinate. Every constructed `Square` is on the board; positions
/// that may be absent (like the en-passant target) are `Option<Square>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    file: i8,
    rank: i8,
}

impl Square {
    pub fn new(file: i8, rank: i8) -> Option<Square> {
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Square { file, rank })
        } else {
            None
        }
    }

    pub fn file(&self) -> i8 {
        self.file
    }

    pub fn rank(&self) -> i8 {
        self.rank
    }

    pub fn index(&self) -> usize {
        (self.rank * 8 + self.file) as usize
    }

    pub fn from_index(index: usize) -> Square {
        debug_assert!(index < 64);
        Square {
            file: (index % 8) as i8,
            rank: (index / 8) as i8,
        }
    }

    /// All 64 squares, rank by rank from a1.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64).map(Square::from_index)
    }

    pub fn offset(&self, df: i8, dr: i8) -> Option<Square> {
        Square::new(self.file + df, self.rank + dr)
    }

    pub fn parse(s: &str) -> Option<Square> {
        let mut chars = s.chars();
        let file = chars.next()? as i8 - 'a' as i8;
        let rank = chars.next()? as i8 - '1' as i8;
        if chars.next().is_some() {
            return None;
        }
        Square::new(file, rank)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (b'a' + self.file as u8) as char,
            (b'1' + self.rank as u8) as char
        )
    }
}

/// The 8x8 grid. Each slot owns at most one piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    squares: [Option<Piece>; 64],
}

impl Position {
    pub fn empty() -> Self {
        Self {
            squares: [None; 64],
        }
    }

    /// The standard starting layout. Exactly one king per side; kings are
    /// never created or destroyed again until the next reset.
    pub fn standard() -> Self {
        let mut position = Position::empty();
        let back_rank = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];
        for side in [Side::White, Side::Black] {
            for (file, &kind) in back_rank.iter().enumerate() {
                let sq = Square::from_index(side.home_rank() as usize * 8 + file);
                position.set(sq, Some(Piece::new(kind, side)));
            }
            for file in 0..8 {
                let sq = Square::from_index(side.pawn_rank() as usize * 8 + file);
                position.set(sq, Some(Piece::new(PieceKind::Pawn, side)));
            }
        }
        position
    }

    pub fn at(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.index()] = piece;
    }

    pub fn take(&mut self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()].take()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let sq = Square::from_index(rank * 8 + file);
                match self.at(sq) {
                    Some(piece) => write!(f, "{}", piece.letter())?,
                    None => write!(f, ".")?,
                }
                if file < 7 {
                    write!(f, " ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
