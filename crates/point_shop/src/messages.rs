//! In-game chat message templates.
//!
//! Templates carry the game server's RichColor markup and positional
//! `{0}`/`{1}` placeholders. The defaults are the shop's stock strings;
//! operators override any of them in the config file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopMessages {
    /// Sender name shown next to every chat line.
    pub sender: String,
    pub received_points: String,
    pub have_points: String,
    pub no_points: String,
    pub cant_give_points: String,
    pub sent_points: String,
    pub got_points: String,
    pub no_player: String,
    pub found_more_players: String,
}

impl Default for ShopMessages {
    fn default() -> Self {
        Self {
            sender: "LegendShop".to_string(),
            received_points:
                "<RichColor Color=\"1, 1, 0, 1\">You have received {0} points! (total: {1})</>"
                    .to_string(),
            have_points: "You have {0} points".to_string(),
            no_points: "<RichColor Color=\"1, 0, 0, 1\">You don't have enough points</>"
                .to_string(),
            cant_give_points:
                "<RichColor Color=\"1, 0, 0, 1\">You can't give points to yourself</>".to_string(),
            sent_points:
                "<RichColor Color=\"0, 1, 0, 1\">You have successfully sent {0} points to {1}</>"
                    .to_string(),
            got_points: "You have received {0} points from {1}".to_string(),
            no_player: "<RichColor Color=\"1, 0, 0, 1\">Player doesn't exist</>".to_string(),
            found_more_players:
                "<RichColor Color=\"1, 0, 0, 1\">Found more than one player with the given name</>"
                    .to_string(),
        }
    }
}

impl ShopMessages {
    pub fn received_points(&self, amount: i64, total: i64) -> String {
        fill(&self.received_points, &[&amount.to_string(), &total.to_string()])
    }

    pub fn have_points(&self, points: i64) -> String {
        fill(&self.have_points, &[&points.to_string()])
    }

    pub fn sent_points(&self, amount: i64, to_name: &str) -> String {
        fill(&self.sent_points, &[&amount.to_string(), to_name])
    }

    pub fn got_points(&self, amount: i64, from_name: &str) -> String {
        fill(&self.got_points, &[&amount.to_string(), from_name])
    }

    /// Assemble the in-game chat command for one player.
    pub fn chat_command(&self, player_name: &str, text: &str) -> String {
        format!("chat {player_name} {} {text}", self.sender)
    }
}

fn fill(template: &str, args: &[&str]) -> String {
    let mut filled = template.to_string();
    for (index, arg) in args.iter().enumerate() {
        filled = filled.replace(&format!("{{{index}}}"), arg);
    }
    filled
}
