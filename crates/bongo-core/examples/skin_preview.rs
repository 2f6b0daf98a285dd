//! Writes every frame of a skin as PNG files.
//!
//! cargo run --example skin_preview -- classic out/

use bongo_core::skin::SkinLibrary;
use bongo_core::types::AnimationState;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "classic".to_string());
    let out = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));

    let library = SkinLibrary::new(bongo_core::ConfigStore::default_dir().join("skins"));
    println!("Available skins: {}", library.available().join(", "));

    let skin = library.load(&name)?;
    std::fs::create_dir_all(&out)?;
    for state in AnimationState::ALL {
        let path = out.join(format!("{}_{}.png", skin.name(), state.frame_name()));
        skin.frame(state).save(&path)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
