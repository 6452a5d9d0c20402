pub mod countries;

// One quiz round: a flag to show and four country names to choose from
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub correct_name: String,
    // Exactly four distinct names, already shuffled; contains `correct_name` once
    pub options: Vec<String>,
    // Lowercase ISO 3166-1 alpha-2 code; the renderer resolves it to a flag image
    pub flag_code: String,
}

impl Question {
    pub fn new(correct_name: String, options: Vec<String>, flag_code: String) -> Self {
        Self {
            correct_name,
            options,
            flag_code,
        }
    }
}

// Score and progress of one quiz run
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Session {
    pub total_rounds: usize,
    pub rounds_played: usize,
    pub score: usize,
}

impl Session {
    pub fn new(total_rounds: usize) -> Self {
        Self {
            total_rounds,
            rounds_played: 0,
            score: 0,
        }
    }

    pub fn record_answer(&mut self, is_correct: bool) {
        self.rounds_played += 1;
        if is_correct {
            self.score += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        return self.rounds_played >= self.total_rounds;
    }
}
