//! Keyword tables driving priority, category, and sentiment estimation.
//!
//! Urgent terms are checked before high terms; category tie-breaks follow
//! table order, so the ordering of `CATEGORY_KEYWORDS` is part of the
//! classifier's contract.

use crate::state::ConcernCategory;

/// Any match forces `urgent`.
pub const URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "emergency",
    "immediately",
    "asap",
    "danger",
    "dangerous",
    "threat",
    "fire",
    "assault",
    "weapon",
    "suicide",
    "unsafe",
    "life-threatening",
    "bleeding",
];

/// Any match (without an urgent hit) forces `high`.
pub const HIGH_KEYWORDS: &[&str] = &[
    "broken",
    "not working",
    "stopped working",
    "failed",
    "failure",
    "deadline",
    "overdue",
    "leak",
    "leaking",
    "outage",
    "no power",
    "no water",
    "stolen",
    "missing",
    "harass",
    "discriminat",
];

/// Category keyword sets; earlier entries win ties.
pub const CATEGORY_KEYWORDS: &[(ConcernCategory, &[&str])] = &[
    (
        ConcernCategory::Safety,
        &[
            "security", "threat", "unsafe", "danger", "assault", "weapon", "fire", "theft",
            "stolen", "stalking", "harass",
        ],
    ),
    (
        ConcernCategory::Facilities,
        &[
            "heater", "heating", "plumbing", "leak", "elevator", "lift", "broken", "repair",
            "dorm", "room", "building", "electricity", "water", "mold", "window", "door",
        ],
    ),
    (
        ConcernCategory::Academic,
        &[
            "exam", "grade", "grading", "course", "lecture", "professor", "assignment",
            "deadline", "registration", "enrolment", "enrollment", "transcript",
        ],
    ),
    (
        ConcernCategory::Technology,
        &[
            "wifi", "wi-fi", "internet", "network", "password", "login", "portal", "email",
            "laptop", "printer", "software", "account locked",
        ],
    ),
    (
        ConcernCategory::Financial,
        &[
            "tuition", "fee", "fees", "payment", "refund", "scholarship", "invoice", "billing",
            "financial aid", "bursary",
        ],
    ),
    (
        ConcernCategory::Wellbeing,
        &[
            "stress", "anxiety", "depression", "counseling", "counselling", "lonely", "sick",
            "illness", "mental health", "overwhelmed",
        ],
    ),
];

/// Positive-tone vote.
pub const POSITIVE_KEYWORDS: &[&str] = &[
    "thank",
    "thanks",
    "appreciate",
    "great",
    "good",
    "helpful",
    "resolved",
    "happy",
    "pleased",
];

/// Negative-tone vote.
pub const NEGATIVE_KEYWORDS: &[&str] = &[
    "angry",
    "furious",
    "frustrated",
    "terrible",
    "awful",
    "worst",
    "unacceptable",
    "disappointed",
    "scared",
    "afraid",
    "threat",
    "ignored",
    "fed up",
];

/// Static category to department routing hint.
pub fn department_hint(category: ConcernCategory) -> &'static str {
    match category {
        ConcernCategory::Safety => "campus-security",
        ConcernCategory::Facilities => "facilities-management",
        ConcernCategory::Academic => "academic-affairs",
        ConcernCategory::Technology => "it-services",
        ConcernCategory::Financial => "student-finance",
        ConcernCategory::Wellbeing => "student-wellbeing",
        ConcernCategory::General => "student-services",
    }
}
