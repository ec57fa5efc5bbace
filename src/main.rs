// src/main.rs

use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::Write;
use std::time::Duration;

use clip_player::{OutputStream, PlaybackController, PlaybackState, PlayerConfig, SoftwareSink};

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let Some(path) = args.get(1) else {
        anyhow::bail!("usage: {} <audio file> [config.json]", args[0]);
    };
    let config = match args.get(2) {
        Some(cfg) => PlayerConfig::load_from_disk(cfg).context("loading player config")?,
        None => PlayerConfig::default(),
    };

    let player = PlaybackController::open(path).with_context(|| format!("opening {path}"))?;
    let sink = SoftwareSink::new(player.source_info().sample_rate as u32);
    let _output = OutputStream::open(&sink).context("opening audio output")?;
    player.attach(Box::new(sink))?;
    player.apply_config(&config)?;
    player.set_completion_handler(|| log::info!("playback finished"));
    player.start()?;

    println!("[SPACE] Play/Stop | [P] Pause/Resume | [R] Reverse | [L] Loop | [Q] Quit");

    enable_raw_mode()?;
    let result = run(&player);
    disable_raw_mode()?;

    println!("\n🛑 Exiting player.");
    result
}

fn run(player: &PlaybackController) -> Result<(), anyhow::Error> {
    // 20 FPS
    let frame = Duration::from_millis(50);

    loop {
        if event::poll(frame)? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind != KeyEventKind::Press {
                    continue;
                }
                if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }
                match ev.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char(' ') => {
                        if player.state() == PlaybackState::Stopped {
                            player.start()?;
                        } else {
                            player.stop()?;
                        }
                    }
                    KeyCode::Char('p') => match player.state() {
                        PlaybackState::Playing => player.pause()?,
                        PlaybackState::Paused => player.resume()?,
                        PlaybackState::Stopped => {}
                    },
                    KeyCode::Char('r') => player.set_reversed(!player.is_reversed())?,
                    KeyCode::Char('l') => player.set_looping(!player.is_looping()),
                    _ => {}
                }
            }
        }

        player.process_events();
        print!(
            "\r{:?} {:>8.3}s / {:.3}s  loop:{} rev:{}   ",
            player.state(),
            player.playhead(),
            player.duration(),
            player.is_looping(),
            player.is_reversed()
        );
        std::io::stdout().flush()?;
    }
    Ok(())
}
