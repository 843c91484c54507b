//! Built-in user directory.

use crate::domain::{UserDirectory, UserId, UserProfile, ValueObjectError};

/// Public rooms listed by `GET /api/rooms`: `(key, name)`.
pub const PUBLIC_ROOMS: [(&str, &str); 2] = [("general", "General"), ("music", "Music")];

/// Users and bots known without any external account system.
pub fn seed_directory() -> Result<UserDirectory, ValueObjectError> {
    let id = |raw: &str| UserId::new(raw.to_string());
    Ok(UserDirectory::new(vec![
        UserProfile::human(id("alice")?, "Alice"),
        UserProfile::human(id("bob")?, "Bob"),
        UserProfile::human(id("charlie")?, "Charlie"),
        UserProfile::bot(id("bot-hal")?, "Hal Bot", "hal").with_personality(
            "burning a mix cd 4 the weekend",
            "Skater kid who thinks everything is either sick or lame",
            "all lowercase, no punctuation, says 'lol' and 'dude' a lot",
        ),
        UserProfile::bot(id("bot-echo")?, "Echo Parrot", "echo").with_personality(
            "~*~ rawr means i love u in dinosaur ~*~",
            "Emo kid who repeats your words back with feeling",
            "Random CaPiTaLs, lots of ~*~ and !!!, ends with xD",
        ),
    ]))
}
