use std::env;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;

use klippfisk::board::PromotionKind;
use klippfisk::bot::{Bot, RandomEngine, SearchOutcome, DEFAULT_DIFFICULTY};
use klippfisk::game::{Game, GameEvent};
use klippfisk::movegen::FullMove;
use klippfisk::uci::UciEngine;

const ENGINE_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    env_logger::init();
    let (engine_path, difficulty) = parse_args()?;

    let mut bot = match engine_path {
        Some(path) => {
            let (engine, results) = UciEngine::spawn(&path)
                .with_context(|| format!("could not start engine at {}", path))?;
            Bot::new(Box::new(engine), results)
        }
        None => {
            info!("no engine given, using the built-in random player");
            let (engine, results) = RandomEngine::new();
            Bot::new(Box::new(engine), results)
        }
    };
    bot.set_difficulty(difficulty);
    bot.reset()?;

    let mut game = Game::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!("You play White. Enter moves in coordinate notation, e.g. e2e4.");
    loop {
        println!("{}", game.position());

        print!("> ");
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" {
            break;
        }
        let mv = match FullMove::parse(input) {
            Some(mv) => mv,
            None => {
                println!("Could not read that as a move.");
                continue;
            }
        };
        if !game.try_move(mv.from, mv.to) {
            println!("Illegal move.");
            continue;
        }
        if let Some(side) = game.awaiting_promotion() {
            let kind = ask_promotion(&mut lines)?;
            game.resolve_promotion(side, kind);
        }
        if report_events(&mut game) {
            println!("{}", game.position());
            break;
        }

        bot.on_player_move(game.state())?;
        match bot.recv_timeout(ENGINE_REPLY_TIMEOUT) {
            Some(SearchOutcome::Move(reply)) => {
                println!("Bot plays {}", reply);
                game.apply_external_move(reply);
            }
            Some(SearchOutcome::NoMove) => {
                println!("Bot has no legal move left.");
                break;
            }
            None => bail!("engine did not reply in time"),
        }
        if report_events(&mut game) {
            println!("{}", game.position());
            break;
        }
    }
    Ok(())
}

fn parse_args() -> Result<(Option<String>, i32)> {
    let mut engine = None;
    let mut difficulty = DEFAULT_DIFFICULTY;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--engine" => engine = Some(args.next().context("--engine needs a path")?),
            "--difficulty" => {
                let value = args.next().context("--difficulty needs a number")?;
                difficulty = value
                    .parse()
                    .with_context(|| format!("bad difficulty value {}", value))?;
            }
            other => bail!("unknown argument {}", other),
        }
    }
    Ok((engine, difficulty))
}

fn ask_promotion(
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<PromotionKind> {
    loop {
        print!("Promote to [q/r/b/n]: ");
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => bail!("input closed during promotion"),
        };
        if let Some(c) = line.trim().chars().next() {
            if let Some(kind) = PromotionKind::from_letter(c.to_ascii_lowercase()) {
                return Ok(kind);
            }
        }
        println!("Unrecognized piece.");
    }
}

// Drains pending game events, printing anything the player should see.
// Returns whether the game has ended.
fn report_events(game: &mut Game) -> bool {
    let mut over = false;
    for event in game.take_events() {
        match event {
            GameEvent::MoveExecuted(mv) => info!("played {}", mv),
            GameEvent::PromotionRequired(side) => {
                info!("{} must choose a promotion piece", side)
            }
            GameEvent::Checkmate { winner, .. } => {
                println!("Checkmate. {} wins.", winner);
                over = true;
            }
            GameEvent::Stalemate { side, .. } => {
                println!("Stalemate. {} has no legal moves.", side);
                over = true;
            }
            GameEvent::Draw { reason, .. } => {
                println!("Draw: {}.", reason);
                over = true;
            }
        }
    }
    over
}
