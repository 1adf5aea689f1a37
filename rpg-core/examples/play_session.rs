//! Play a short scripted session against an on-disk store.
//!
//! Run with: `RUST_LOG=rpg_core=debug cargo run -p rpg-core --example play_session`

use rand::rngs::StdRng;
use rand::SeedableRng;
use rpg_core::character::{CharacterClass, Race, SkillName};
use rpg_core::character_builder::CharacterBuilder;
use rpg_core::dice::DieType;
use rpg_core::narrator::CannedNarrator;
use rpg_core::persist::{JsonDirStore, RetryPolicy, RetryingStore};
use rpg_core::session::{CampaignSession, SessionConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rpg_core=info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(42);
    let thorin = CharacterBuilder::new()
        .name("Thorin")
        .race(Race::Dwarf)
        .class(CharacterClass::Fighter)
        .roll_ability_scores(&mut rng)
        .build()?;
    let lyra = CharacterBuilder::new()
        .name("Lyra")
        .race(Race::Halfling)
        .class(CharacterClass::Rogue)
        .background("Former pickpocket")
        .roll_ability_scores(&mut rng)
        .build()?;
    let thorin_id = thorin.id;
    let lyra_id = lyra.id;

    let save_dir = std::env::temp_dir().join("rpg-core-demo");
    let store = RetryingStore::new(JsonDirStore::new(&save_dir), RetryPolicy::default());
    let config = SessionConfig::new("The Sunken Crypt").with_seed(42);

    let session = CampaignSession::create(
        config,
        Arc::new(store),
        Arc::new(CannedNarrator::new(42)),
        vec![thorin, lyra],
    )
    .await?;
    println!("=== {} ===\n", session.snapshot().await.name);

    for (speaker, action) in [
        ("Thorin", "I walk down the mossy stairs"),
        ("Lyra", "I look for traps along the walls"),
    ] {
        let narration = session.player_action(speaker, action).await?;
        println!("{speaker}: {action}\nDM: {}\n", narration.content);
    }

    let check = session.skill_check(lyra_id, SkillName::Stealth, 13).await?;
    println!(
        "Lyra sneaks ahead: {} vs DC 13 ({})\n",
        check.roll.final_total,
        if check.success { "success" } else { "failure" }
    );

    let encounter = session.start_encounter().await?;
    let names: Vec<_> = encounter.enemies.iter().map(|e| e.name.as_str()).collect();
    println!("Enemies appear: {}", names.join(", "));

    for enemy in &encounter.enemies {
        let damage = session.roll_dice("Thorin", DieType::D8, 2, 3).await?;
        let outcome = session.attack_enemy(enemy.id, damage.final_total).await?;
        println!("Thorin hits {} for {}", enemy.name, outcome.report.dealt);
        if outcome.report.combat_ended {
            if let Some(loot) = &outcome.loot {
                println!("Loot: {} gold, {} item(s)", loot.gold, loot.items.len());
            }
            break;
        }
        session.advance_turn().await?;
        if !outcome.report.defeated {
            let strike = session.enemy_attack(enemy.id, thorin_id).await?;
            if strike.hit {
                println!("{} strikes back for {} damage", enemy.name, strike.damage);
            }
        }
    }
    session.end_combat().await?;

    let campaign = session.snapshot().await;
    println!("\n--- Story log ({} entries) ---", campaign.story_log().len());
    for entry in campaign.story_log() {
        let speaker = entry.speaker.as_deref().unwrap_or("DM");
        println!("[{}] {}: {}", entry.entry_type, speaker, entry.content);
    }
    println!("\nSaved under {}", save_dir.display());
    Ok(())
}
