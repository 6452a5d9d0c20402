use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};

use crate::quiz;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("not enough countries match the selected continent to build a question")]
    InsufficientCandidates,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Country {
    pub name: String,
    pub continent: String,
    // Lowercase ISO 3166-1 alpha-2 code used to look up the flag image
    pub code: String,
}

// Which countries take part in a quiz run
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContinentFilter {
    #[default]
    All,
    Continent(String),
}

impl ContinentFilter {
    pub fn matches(&self, country: &Country) -> bool {
        match self {
            ContinentFilter::All => true,
            ContinentFilter::Continent(continent) => &country.continent == continent,
        }
    }
}

impl std::fmt::Display for ContinentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContinentFilter::All => write!(f, "All Continents"),
            ContinentFilter::Continent(continent) => write!(f, "{}", continent),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountryPool {
    pub countries: Vec<Country>,
}

impl CountryPool {
    // Reads one "name;continent;code" record per line. Duplicate names and
    // malformed records are data defects, so loading panics on them.
    pub fn new<R: Read>(source: R) -> Self {
        let mut countries: Vec<Country> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let reader = BufReader::new(source);

        for line in reader.lines() {
            let line = line.expect("Failed to read line");
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(';').map(|f| f.trim()).collect();
            assert!(
                fields.len() == 3,
                "Expected 'name;continent;code', got: {}",
                line
            );

            let country = Country {
                name: fields[0].to_string(),
                continent: fields[1].to_string(),
                code: fields[2].to_string(),
            };
            assert!(
                seen_names.insert(country.name.clone()),
                "Duplicate country name: {}",
                country.name
            );
            countries.push(country);
        }

        return Self { countries };
    }

    // Sorted distinct continents, for the continent-choice keyboard
    pub fn continents(&self) -> Vec<String> {
        let mut continents: Vec<String> = self
            .countries
            .iter()
            .map(|c| c.continent.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        continents.sort();
        return continents;
    }

    // Builds one round: picks a correct country from the filtered pool and
    // three distractors, preferring the correct country's own continent and
    // falling back to the rest of the pool only when it runs short.
    // `exclude` keeps the previous round's country from being asked twice in
    // a row; it is ignored if skipping it would leave nothing to pick.
    pub fn generate_question<R: Rng>(
        &self,
        filter: &ContinentFilter,
        exclude: Option<&str>,
        rng: &mut R,
    ) -> Result<quiz::Question, QuizError> {
        let filtered: Vec<&Country> = self
            .countries
            .iter()
            .filter(|c| filter.matches(c))
            .collect();
        if filtered.len() < 4 {
            return Err(QuizError::InsufficientCandidates);
        }

        let correct = {
            let candidates: Vec<&Country> = match exclude {
                Some(name) => filtered.iter().copied().filter(|c| c.name != name).collect(),
                None => filtered.clone(),
            };
            // `filtered` has at least 4 entries, so one of the two is non-empty
            let pick_from = if candidates.is_empty() {
                &filtered
            } else {
                &candidates
            };
            *pick_from.choose(rng).unwrap()
        };

        let same_continent: Vec<&Country> = filtered
            .iter()
            .copied()
            .filter(|c| c.name != correct.name && c.continent == correct.continent)
            .collect();
        // Fallback distractors come from the whole pool, not just the filter
        let other_continent: Vec<&Country> = self
            .countries
            .iter()
            .filter(|c| c.continent != correct.continent && c.name != correct.name)
            .collect();

        let same_count = same_continent.len().min(3);
        let other_count = 3 - same_count;

        let mut distractors: Vec<&Country> = same_continent
            .choose_multiple(rng, same_count)
            .copied()
            .collect();
        distractors.extend(other_continent.choose_multiple(rng, other_count).copied());

        if distractors.len() < 3 {
            // Can only happen on a defective pool; never substitute silently
            return Err(QuizError::InsufficientCandidates);
        }

        let mut options: Vec<String> = Vec::with_capacity(4);
        options.push(correct.name.clone());
        options.extend(distractors.iter().map(|c| c.name.clone()));
        options.shuffle(rng);

        return Ok(quiz::Question::new(
            correct.name.clone(),
            options,
            correct.code.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool_of(entries: &[(&str, &str)]) -> CountryPool {
        let countries = entries
            .iter()
            .enumerate()
            .map(|(i, (name, continent))| Country {
                name: name.to_string(),
                continent: continent.to_string(),
                code: format!("c{}", i),
            })
            .collect();
        CountryPool { countries }
    }

    fn continent_of(pool: &CountryPool, name: &str) -> String {
        pool.countries
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.continent.clone())
            .unwrap()
    }

    #[test]
    fn generates_four_distinct_options_including_the_correct_one() {
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Japan", "Asia"),
            ("Brazil", "South America"),
            ("Kenya", "Africa"),
            ("Canada", "North America"),
        ]);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..50 {
            let question = pool
                .generate_question(&ContinentFilter::All, None, &mut rng)
                .unwrap();
            assert_eq!(question.options.len(), 4);
            let distinct: HashSet<&String> = question.options.iter().collect();
            assert_eq!(distinct.len(), 4);
            assert_eq!(
                question
                    .options
                    .iter()
                    .filter(|o| **o == question.correct_name)
                    .count(),
                1
            );
        }
    }

    #[test]
    fn fails_when_filtered_pool_is_too_small() {
        let pool = pool_of(&[
            ("Australia", "Oceania"),
            ("Fiji", "Oceania"),
            ("Samoa", "Oceania"),
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Spain", "Europe"),
            ("Italy", "Europe"),
        ]);
        let mut rng = StdRng::seed_from_u64(2);

        let result = pool.generate_question(
            &ContinentFilter::Continent("Oceania".to_string()),
            None,
            &mut rng,
        );
        assert_eq!(result.unwrap_err(), QuizError::InsufficientCandidates);
    }

    #[test]
    fn fails_on_an_empty_pool() {
        let pool = CountryPool::default();
        let mut rng = StdRng::seed_from_u64(3);

        let result = pool.generate_question(&ContinentFilter::All, None, &mut rng);
        assert_eq!(result.unwrap_err(), QuizError::InsufficientCandidates);
    }

    #[test]
    fn prefers_distractors_from_the_same_continent() {
        // Europe has enough countries on its own, so no distractor should
        // ever come from Asia
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Spain", "Europe"),
            ("Italy", "Europe"),
            ("Portugal", "Europe"),
            ("Japan", "Asia"),
            ("China", "Asia"),
            ("India", "Asia"),
            ("Thailand", "Asia"),
        ]);
        let mut rng = StdRng::seed_from_u64(4);

        for _ in 0..50 {
            let question = pool
                .generate_question(
                    &ContinentFilter::Continent("Europe".to_string()),
                    None,
                    &mut rng,
                )
                .unwrap();
            for option in &question.options {
                assert_eq!(continent_of(&pool, option), "Europe");
            }
        }
    }

    #[test]
    fn fills_the_deficit_from_other_continents() {
        // Whichever continent the correct country lands on, it has only 2
        // same-continent distractors, so exactly one must come from the other
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Spain", "Europe"),
            ("Japan", "Asia"),
            ("China", "Asia"),
            ("India", "Asia"),
        ]);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..50 {
            let question = pool
                .generate_question(&ContinentFilter::All, None, &mut rng)
                .unwrap();
            let home = continent_of(&pool, &question.correct_name);
            let from_home = question
                .options
                .iter()
                .filter(|o| continent_of(&pool, o) == home)
                .count();
            assert_eq!(question.options.len(), 4);
            assert_eq!(from_home, 3); // the correct one plus 2 distractors
        }
    }

    #[test]
    fn four_country_pool_uses_every_country() {
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Japan", "Asia"),
            ("Brazil", "South America"),
            ("Kenya", "Africa"),
        ]);
        let mut rng = StdRng::seed_from_u64(6);

        let question = pool
            .generate_question(&ContinentFilter::All, None, &mut rng)
            .unwrap();
        let mut options = question.options.clone();
        options.sort();
        assert_eq!(options, vec!["Brazil", "France", "Japan", "Kenya"]);
    }

    #[test]
    fn excluded_country_is_never_the_correct_answer() {
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Spain", "Europe"),
            ("Italy", "Europe"),
            ("Portugal", "Europe"),
        ]);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let question = pool
                .generate_question(&ContinentFilter::All, Some("France"), &mut rng)
                .unwrap();
            assert_ne!(question.correct_name, "France");
        }
    }

    #[test]
    fn loads_records_and_skips_comments_and_blank_lines() {
        let data = "\
# name;continent;code
France;Europe;fr

  Japan ; Asia ; jp
Brazil;South America;br
";
        let pool = CountryPool::new(data.as_bytes());

        assert_eq!(pool.countries.len(), 3);
        assert_eq!(pool.countries[0].name, "France");
        assert_eq!(pool.countries[1].name, "Japan");
        assert_eq!(pool.countries[1].continent, "Asia");
        assert_eq!(pool.countries[1].code, "jp");
        assert_eq!(pool.countries[2].continent, "South America");
    }

    #[test]
    #[should_panic(expected = "Expected 'name;continent;code'")]
    fn loading_panics_on_a_malformed_record() {
        CountryPool::new("France;Europe".as_bytes());
    }

    #[test]
    #[should_panic(expected = "Duplicate country name")]
    fn loading_panics_on_a_duplicate_name() {
        let data = "\
France;Europe;fr
Japan;Asia;jp
France;Europe;fr
";
        CountryPool::new(data.as_bytes());
    }

    #[test]
    fn continents_are_sorted_and_distinct() {
        let pool = pool_of(&[
            ("Japan", "Asia"),
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Kenya", "Africa"),
            ("China", "Asia"),
        ]);
        assert_eq!(pool.continents(), vec!["Africa", "Asia", "Europe"]);
    }

    #[test]
    fn question_carries_the_flag_code_of_the_correct_country() {
        let pool = pool_of(&[
            ("France", "Europe"),
            ("Germany", "Europe"),
            ("Spain", "Europe"),
            ("Italy", "Europe"),
        ]);
        let mut rng = StdRng::seed_from_u64(7);

        let question = pool
            .generate_question(&ContinentFilter::All, None, &mut rng)
            .unwrap();
        let correct = pool
            .countries
            .iter()
            .find(|c| c.name == question.correct_name)
            .unwrap();
        assert_eq!(question.flag_code, correct.code);
    }
}
