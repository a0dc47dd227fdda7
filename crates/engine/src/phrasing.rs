use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Narrative wrappers for a line of dialogue. `{name}` is the speaker's
/// display name and `{text}` the spoken line.
pub const SPEECH_TEMPLATES: [&str; 6] = [
    "{name} says, \"{text}\"",
    "\"{text}\" {name} declares.",
    "{name} mutters, \"{text}\"",
    "\"{text}\" says {name}.",
    "{name} calls out, \"{text}\"",
    "With a glance around, {name} says, \"{text}\"",
];

/// Turns a raw line and the speaker's name into the caption that is shown.
pub trait SpeechPhrasing {
    fn compose(&mut self, text: &str, actor_name: &str) -> String;
}

impl<F> SpeechPhrasing for F
where
    F: FnMut(&str, &str) -> String,
{
    fn compose(&mut self, text: &str, actor_name: &str) -> String {
        self(text, actor_name)
    }
}

pub fn apply_template(template: &str, text: &str, actor_name: &str) -> String {
    template
        .replace("{name}", actor_name)
        .replace("{text}", text.trim())
}

/// Picks a template at random for every line.
#[derive(Debug, Clone)]
pub struct RandomPhrasing {
    rng: StdRng,
}

impl RandomPhrasing {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPhrasing {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechPhrasing for RandomPhrasing {
    fn compose(&mut self, text: &str, actor_name: &str) -> String {
        let index = self.rng.gen_range(0..SPEECH_TEMPLATES.len());
        apply_template(SPEECH_TEMPLATES[index], text, actor_name)
    }
}

/// Always uses the same template. Out-of-range indices wrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedPhrasing(pub usize);

impl SpeechPhrasing for FixedPhrasing {
    fn compose(&mut self, text: &str, actor_name: &str) -> String {
        let template = SPEECH_TEMPLATES[self.0 % SPEECH_TEMPLATES.len()];
        apply_template(template, text, actor_name)
    }
}
