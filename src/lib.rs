pub mod board;
pub mod bot;
pub mod fen;
pub mod game;
pub mod movegen;
pub mod state;
pub mod uci;

#[cfg(test)]
mod tests {
    use crate::board::{PieceKind, PromotionKind, Side, Square};
    use crate::game::{Game, GameEvent};
    use crate::movegen;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    fn count_moves(game: &Game, side: Side) -> usize {
        Square::all()
            .filter(|&from| matches!(game.state().board().at(from), Some(p) if p.side == side))
            .map(|from| movegen::legal_moves(game.state(), from).len())
            .sum()
    }

    #[test]
    fn test_scholars_mate_sequence() {
        let mut game = Game::new();
        let script = [
            ("e2", "e4"),
            ("e7", "e5"),
            ("f1", "c4"),
            ("b8", "c6"),
            ("d1", "h5"),
            ("g8", "f6"),
            ("h5", "f7"),
        ];
        for (from, to) in script {
            assert!(game.try_move(sq(from), sq(to)), "{}{} rejected", from, to);
        }

        assert!(game.is_in_check(Side::Black));
        assert_eq!(count_moves(&game, Side::Black), 0);
        let events = game.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::Checkmate { winner: Side::White, .. })));
    }

    #[test]
    fn test_en_passant_full_sequence() {
        let mut game = Game::new();
        assert!(game.try_move(sq("e2"), sq("e4")));
        assert!(game.try_move(sq("a7"), sq("a6")));
        assert!(game.try_move(sq("e4"), sq("e5")));
        assert!(game.try_move(sq("d7"), sq("d5")));

        // The double advance opens the en passant window for one ply.
        assert_eq!(game.state().en_passant_target(), Some(sq("d5")));
        assert!(game.try_move(sq("e5"), sq("d6")));
        assert!(game.state().board().at(sq("d5")).is_none());
        assert_eq!(game.state().en_passant_target(), None);
        assert_eq!(game.captured_pieces(Side::White).len(), 1);
    }

    #[test]
    fn test_no_legal_move_leaves_own_king_in_check() {
        let fens = [
            crate::fen::START_FEN,
            "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5Q2/PPPP1PPP/RNB1K1NR b KQkq - 0 1",
            "8/8/8/3k4/8/3q4/8/3K4 w - - 0 1",
        ];
        for fen in fens {
            let game = Game::from_fen(fen).unwrap();
            let state = game.state();
            let side = state.side_to_move();
            for from in Square::all() {
                match state.board().at(from) {
                    Some(p) if p.side == side => {}
                    _ => continue,
                }
                for mv in movegen::legal_moves(state, from) {
                    assert!(
                        !state.move_leaves_in_check(from, mv.to),
                        "{} to {} leaves own king attacked in {}",
                        from,
                        mv.to,
                        fen
                    );
                }
            }
        }
    }

    #[test]
    fn test_castling_rights_lost_permanently() {
        let mut game =
            Game::from_fen("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1").unwrap();

        // Move the king out and back. Castling must stay gone.
        assert!(game.try_move(sq("e1"), sq("f1")));
        assert!(game.try_move(sq("a7"), sq("a6")));
        assert!(game.try_move(sq("f1"), sq("e1")));
        assert!(game.try_move(sq("a6"), sq("a5")));

        let moves = movegen::legal_moves(game.state(), sq("e1"));
        assert!(moves.iter().all(|m| m.to != sq("g1") && m.to != sq("c1")));
        let fen = game.state().fen();
        assert_eq!(fen.split_whitespace().nth(2), Some("kq"));
    }

    #[test]
    fn test_promotion_flows_through_game_and_fen() {
        let mut game = Game::from_fen("8/P3k3/8/8/8/8/4K3/8 w - - 0 1").unwrap();
        assert!(game.try_move(sq("a7"), sq("a8")));
        assert_eq!(game.awaiting_promotion(), Some(Side::White));

        game.resolve_promotion(Side::White, PromotionKind::Rook);
        let piece = game.state().board().at(sq("a8")).unwrap();
        assert_eq!(piece.kind, PieceKind::Rook);
        assert!(game.state().fen().starts_with("R7/4k3"));
        assert_eq!(game.side_to_move(), Side::Black);
    }

    #[test]
    fn test_capture_postpones_fifty_move_draw() {
        let mut game =
            Game::from_fen("7k/8/8/8/3r4/8/3R4/7K w - - 98 60").unwrap();

        // A capture resets the clock, so the draw stays out of reach.
        assert!(game.try_move(sq("d2"), sq("d4")));
        assert_eq!(game.state().half_move_clock(), 1);
        assert!(game
            .take_events()
            .iter()
            .all(|e| !matches!(e, GameEvent::Draw { .. })));
    }

    #[test]
    fn test_full_move_counter_in_fen() {
        let mut game = Game::new();
        assert!(game.try_move(sq("g1"), sq("f3")));
        assert!(game.state().fen().ends_with("b KQkq - 1 1"));
        assert!(game.try_move(sq("g8"), sq("f6")));
        assert!(game.state().fen().ends_with("w KQkq - 2 2"));
    }
}
