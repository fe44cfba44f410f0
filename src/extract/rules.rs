//! Ordered classification rules.
//!
//! Each rule pairs a phrase list (the predicate: any phrase is a
//! substring of the cleaned, lower-cased notification text) with a
//! classifier that picks the final kind. Rules are evaluated top to
//! bottom and the first match wins, so the order is significant:
//! hold-release wording also contains generic words and must be checked
//! first, and incoming transfers come last among the financial kinds.

use crate::types::EventKind;

pub struct Rule {
    pub name: &'static str,
    pub phrases: &'static [&'static str],
    pub classify: fn(&str) -> EventKind,
}

impl Rule {
    pub fn matches(&self, lowered: &str) -> bool {
        self.phrases.iter().any(|p| lowered.contains(p))
    }
}

/// Phrases indicating that an incoming transfer is held.
pub const HOLD_PHRASES: &[&str] = &["холд закончится", "установлен холд", "холд до"];

fn transfer_kind(lowered: &str) -> EventKind {
    if HOLD_PHRASES.iter().any(|p| lowered.contains(p)) {
        EventKind::TransferInHold
    } else {
        EventKind::TransferIn
    }
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "hold_released",
        phrases: &[
            "холд на платеж",
            "холд закончился",
            "холд по платежу снят",
            "холд завершился",
        ],
        classify: |_| EventKind::HoldReleased,
    },
    Rule {
        name: "like",
        phrases: &["нравится ваше сообщение", "нравится ваш комментарий"],
        classify: |_| EventKind::Like,
    },
    Rule {
        name: "mention",
        phrases: &["упомянул(а) вас", "упомянул вас", "упомянул(а) в сообщении"],
        classify: |_| EventKind::Mention,
    },
    Rule {
        name: "comment",
        phrases: &[
            "прокомментировал(а) ваше сообщение",
            "прокомментировал ваше сообщение",
        ],
        classify: |_| EventKind::Comment,
    },
    Rule {
        name: "profile_comment",
        phrases: &[
            "прокомментировал(а) запись в вашем профиле",
            "прокомментировал вашу запись на стене",
            "вашей записи на стене",
            "запись в вашем профиле",
        ],
        classify: |_| EventKind::ProfileComment,
    },
    Rule {
        name: "profile_post",
        phrases: &[
            "написал(а) на вашей стене",
            "оставил(а) сообщение в вашем профиле",
            "сообщение на вашей стене",
        ],
        classify: |_| EventKind::ProfilePost,
    },
    Rule {
        name: "payment_in",
        phrases: &["зачислены на ваш баланс", "пополнение баланса", "получен платеж"],
        classify: |_| EventKind::PaymentIn,
    },
    Rule {
        name: "transfer_in",
        phrases: &["отправил(а) вам", "перевёл вам", "перевел вам", "перевёл(а) вам", "перевел(а) вам"],
        classify: transfer_kind,
    },
];

/// Verb phrases used to locate the actor: the member link closest before
/// the first of these is the one who acted.
pub const ACTOR_VERBS: &[&str] = &[
    "упомянул(а)",
    "упомянул",
    "прокомментировал(а)",
    "прокомментировал",
    "нравится ваше сообщение",
    "нравится ваш комментарий",
    "написал(а) сообщение в вашем профиле",
    "написал(а) на вашей стене",
    "оставил(а) сообщение в вашем профиле",
    "отправил(а) вам",
    "перевёл",
    "перевел",
];

/// Classify lower-cased text. `None` when no rule matches.
pub fn classify(lowered: &str) -> Option<EventKind> {
    RULES
        .iter()
        .find(|rule| rule.matches(lowered))
        .map(|rule| (rule.classify)(lowered))
}

/// Char offset of the earliest actor verb in lower-cased text.
pub fn first_verb_position(lowered: &str) -> Option<usize> {
    ACTOR_VERBS
        .iter()
        .filter_map(|verb| lowered.find(verb))
        .min()
        .map(|byte_idx| lowered[..byte_idx].chars().count())
}
