use anyhow::Result;
use clap::{Parser, Subcommand};
use panel_core::{SERVO_BUTTONS_KEY, SERVO_SETTINGS_GROUP};
use settings::SettingsStore;
use shared::encoding::decode_buttons;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/panel.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every settings group in the database.
    Groups,
    /// Print all key/value pairs of one group.
    Dump {
        group: String,
    },
    Get {
        group: String,
        key: String,
    },
    Set {
        group: String,
        key: String,
        value: String,
    },
    Unset {
        group: String,
        key: String,
    },
    /// Decode and print the persisted servo button list.
    ShowButtons,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let store = SettingsStore::new(&cli.database_url).await?;

    match cli.command {
        Command::Groups => {
            for group in store.list_groups().await? {
                println!("{group}");
            }
        }
        Command::Dump { group } => {
            for (key, value) in store.list_group(&group).await? {
                println!("{key}={value}");
            }
        }
        Command::Get { group, key } => match store.read_value(&group, &key).await? {
            Some(value) => println!("{value}"),
            None => println!("(unset)"),
        },
        Command::Set { group, key, value } => {
            store.write_value(&group, &key, &value).await?;
            println!("wrote {group}/{key}");
        }
        Command::Unset { group, key } => {
            if store.delete_value(&group, &key).await? {
                println!("removed {group}/{key}");
            } else {
                println!("{group}/{key} was not set");
            }
        }
        Command::ShowButtons => {
            let raw = store
                .read_value(SERVO_SETTINGS_GROUP, SERVO_BUTTONS_KEY)
                .await?
                .unwrap_or_default();
            let buttons = decode_buttons(&raw)?;
            if buttons.is_empty() {
                println!("no buttons stored");
            }
            for (index, button) in buttons.iter().enumerate() {
                println!(
                    "{index}: {} output={} pulse_width={}",
                    button.name, button.servo_output, button.pulse_width
                );
            }
        }
    }

    Ok(())
}
