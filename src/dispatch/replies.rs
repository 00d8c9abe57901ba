//! Reply texts

use crate::db::Participant;

pub const GREETING: &str = "Hi there, welcome to the gift exchange 🤙";
pub const HINT_MEMBERS: &str = "Use /getmembers to see everyone taking part";
pub const HINT_WISH_LIST: &str = "Use /setwishlist to tell your Santa what you would like";
pub const HINT_TAKE_RECIPIENT: &str = "Use /takerecipient to find out who you are giving a gift to. \
     No rush though, wait until everyone has joined";

pub const PROMPT_WISH_LIST: &str = "Send your wish list in the next message: what you would like and what you would not";
pub const PROMPT_TO_RECIPIENT: &str = "Send the message for your recipient in the next message";
pub const PROMPT_TO_SANTA: &str = "Send the message for your Santa in the next message";

pub const WISH_LIST_SAVED: &str = "Got it! Your wishes will be taken into account";
pub const WISH_LIST_CHANGED: &str = "Your recipient has updated their wish list";
pub const FROM_SANTA: &str = "Your Santa wants to tell you something";
pub const FROM_RECIPIENT: &str = "Your recipient wants to tell you something";
pub const MESSAGE_RELAYED: &str = "Your message has been passed on";
pub const NO_PAIRING_YET: &str = "There is nobody to pass this on to yet";

pub const ALREADY_PAIRED: &str = "You already have a pairing";
pub const TRY_AGAIN: &str = "Oops! Please try again";
pub const SOMETHING_WENT_WRONG: &str = "Something went wrong :(";
pub const DATA_RESET: &str = "All participant data has been deleted";
pub const NO_WISHES: &str = "Your recipient has not said what they would like";

const WISH_LIST_MARKER: &str = " 📃";
const ASSIGNED_MARKER: &str = " 🎅";

pub fn joined(display_name: &str) -> String {
    format!("{display_name} joined the game 👏")
}

pub fn recipient_found(display_name: &str) -> String {
    format!("I found you a match, and it is {display_name} 🎉🎉🎉")
}

/// Numbered list in registration order, decorated with a wish-list marker
/// and an assignment marker
pub fn member_list(participants: &[Participant]) -> String {
    let mut text = String::from("Participants:");
    for (index, participant) in participants.iter().enumerate() {
        text.push('\n');
        text.push_str(&format!("{}. {}", index + 1, participant.display_name()));
        if participant.has_wish_list() {
            text.push_str(WISH_LIST_MARKER);
        }
        if participant.has_recipient() {
            text.push_str(ASSIGNED_MARKER);
        }
    }
    text
}

/// Admin view: names with identifiers
pub fn data_dump(participants: &[Participant]) -> String {
    let mut text = String::from("Participants:");
    for (index, participant) in participants.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} id: {}",
            index + 1,
            participant.display_name(),
            participant.id
        ));
    }
    text
}

/// Recipient's wish list for the giver, or `None` when they left it blank
pub fn wish_list_html(recipient: &Participant) -> Option<String> {
    if !recipient.has_wish_list() {
        return None;
    }
    let wishes = recipient.wish_list.as_deref().unwrap_or_default();
    Some(format!(
        "<b>Your recipient's wishes 💁:</b>\n{}",
        escape_html(wishes)
    ))
}

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn participant(id: i64, name: &str) -> Participant {
        Participant {
            id,
            first_name: Some(name.to_string()),
            last_name: None,
            username: None,
            wish_list: None,
            recipient_id: None,
            santa_id: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_member_list_markers() {
        let mut ann = participant(1, "Ann");
        ann.wish_list = Some("socks".to_string());
        let mut bob = participant(2, "Bob");
        bob.recipient_id = Some(1);
        let mut cid = participant(3, "Cid");
        cid.wish_list = Some("tea".to_string());
        cid.recipient_id = Some(2);
        let dee = participant(4, "Dee");

        assert_eq!(
            member_list(&[ann, bob, cid, dee]),
            "Participants:\n1. Ann 📃\n2. Bob 🎅\n3. Cid 📃 🎅\n4. Dee"
        );
    }

    #[test]
    fn test_data_dump_includes_ids() {
        assert_eq!(
            data_dump(&[participant(10, "Ann"), participant(20, "Bob")]),
            "Participants:\n1. Ann id: 10\n2. Bob id: 20"
        );
    }

    #[test]
    fn test_wish_list_html_is_escaped() {
        let mut ann = participant(1, "Ann");
        assert_eq!(wish_list_html(&ann), None);

        ann.wish_list = Some("<script> & \"more\"".to_string());
        assert_eq!(
            wish_list_html(&ann).unwrap(),
            "<b>Your recipient's wishes 💁:</b>\n&lt;script&gt; &amp; &quot;more&quot;"
        );
    }
}
