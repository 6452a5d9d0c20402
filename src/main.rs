mod quiz;

use std::{fs::File, sync::Arc};

use dotenv::dotenv;
use quiz::countries::{ContinentFilter, CountryPool, QuizError};
use quiz::{Question, Session};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup},
};
use url::Url;

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveContinentChoice,
    ReceiveRoundsChoice {
        filter: ContinentFilter,
    },
    FlagQuiz {
        filter: ContinentFilter,
        session: Session,
        question: Question,
    },
}

type DialogueStorage = std::sync::Arc<ErasedStorage<State>>;

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");

    pretty_env_logger::init();
    log::info!("Starting flag quiz bot...");

    let bot = Bot::from_env();

    println!("Establishing connection to the database...");
    let storage: DialogueStorage = SqliteStorage::open("db.sqlite", Json)
        .await
        .unwrap()
        .erase();
    println!("Connection established");

    // Load the country dataset
    println!("Loading the country dataset");
    let pool = Arc::new(CountryPool::new(
        File::open("countries.txt").expect("Failed to open file 'countries.txt'"),
    ));
    log::info!(
        "Loaded {} countries across {} continents",
        pool.countries.len(),
        pool.continents().len()
    );

    let pool_for_start = pool.clone();
    let pool_for_continent = pool.clone();
    let pool_for_rounds = pool.clone();
    let pool_for_quiz = pool.clone();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(
                dptree::case![State::Start].endpoint(
                    move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                        start(pool_for_start.clone(), bot, dialogue, msg)
                    },
                ),
            )
            .branch(dptree::case![State::ReceiveContinentChoice].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, msg: Message| {
                    receive_continent_choice(pool_for_continent.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::ReceiveRoundsChoice { filter }].endpoint(
                move |bot: Bot, dialogue: QuizDialogue, filter: ContinentFilter, msg: Message| {
                    receive_rounds_choice(pool_for_rounds.clone(), bot, dialogue, filter, msg)
                },
            ))
            .branch(
                dptree::case![State::FlagQuiz {
                    filter,
                    session,
                    question
                }]
                .endpoint(
                    move |bot: Bot,
                          dialogue: QuizDialogue,
                          (filter, session, question): (ContinentFilter, Session, Question),
                          msg: Message| {
                        flag_quiz(
                            pool_for_quiz.clone(),
                            bot,
                            dialogue,
                            (filter, session, question),
                            msg,
                        )
                    },
                ),
            ),
    )
    .dependencies(dptree::deps![storage])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const ALL_CONTINENTS: &str = "All Continents";
const GREETING_TEXT: &str =
    "Hi! I'm the flag quiz bot. I'll show you a flag and you guess which country it belongs to. Which continent would you like to play?";

fn continent_keyboard(pool: &CountryPool) -> KeyboardMarkup {
    let mut rows = vec![vec![KeyboardButton::new(ALL_CONTINENTS)]];
    for continent in pool.continents() {
        rows.push(vec![KeyboardButton::new(continent)]);
    }
    KeyboardMarkup::new(rows)
}

async fn start(
    pool: Arc<CountryPool>,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(continent_keyboard(&pool))
        .await?;

    dialogue.update(State::ReceiveContinentChoice).await?;
    Ok(())
}

async fn receive_continent_choice(
    pool: Arc<CountryPool>,
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
) -> HandlerResult {
    let choice = match msg.text() {
        Some(text) => text,
        None => {
            bot.send_message(msg.chat.id, "Please choose a continent from the keyboard")
                .reply_markup(continent_keyboard(&pool))
                .await?;
            return Ok(());
        }
    };

    let filter = if choice == ALL_CONTINENTS {
        ContinentFilter::All
    } else if pool.continents().iter().any(|c| c == choice) {
        ContinentFilter::Continent(choice.to_string())
    } else {
        bot.send_message(msg.chat.id, "Please choose a continent from the keyboard")
            .reply_markup(continent_keyboard(&pool))
            .await?;
        return Ok(());
    };

    let keyboard = KeyboardMarkup::new(vec![
        vec![KeyboardButton::new("5")],
        vec![KeyboardButton::new("10")],
        vec![KeyboardButton::new("15")],
    ]);
    bot.send_message(
        msg.chat.id,
        format!("Playing {}. How many rounds?", filter),
    )
    .reply_markup(keyboard)
    .await?;

    dialogue
        .update(State::ReceiveRoundsChoice { filter })
        .await?;
    Ok(())
}

async fn receive_rounds_choice(
    pool: Arc<CountryPool>,
    bot: Bot,
    dialogue: QuizDialogue,
    filter: ContinentFilter,
    msg: Message,
) -> HandlerResult {
    if let None = msg.text() {
        bot.send_message(msg.chat.id, "Please enter a number")
            .await?;
        return Ok(());
    }
    if let Err(_) = msg.text().unwrap().parse::<usize>() {
        bot.send_message(msg.chat.id, "Please enter a number")
            .await?;
        return Ok(());
    }

    // It is safe to unwrap here because we've already checked that the input is a number
    let total_rounds: usize = msg.text().unwrap().parse().unwrap();
    if total_rounds == 0 {
        bot.send_message(msg.chat.id, "The number of rounds can't be 0")
            .await?;
        return Ok(());
    }

    // Bound to a variable so the thread rng is dropped before any await
    let generated = pool.generate_question(&filter, None, &mut rand::thread_rng());
    let question = match generated {
        Ok(question) => question,
        Err(QuizError::InsufficientCandidates) => {
            bot.send_message(
                msg.chat.id,
                "Not enough countries on this continent. Please select a different one.",
            )
            .reply_markup(continent_keyboard(&pool))
            .await?;
            dialogue.update(State::ReceiveContinentChoice).await?;
            return Ok(());
        }
    };

    let session = Session::new(total_rounds);
    send_question(&bot, msg.chat.id, &session, &question).await?;

    dialogue
        .update(State::FlagQuiz {
            filter,
            session,
            question,
        })
        .await?;
    Ok(())
}

async fn flag_quiz(
    pool: Arc<CountryPool>,
    bot: Bot,
    dialogue: QuizDialogue,
    (filter, session, question): (ContinentFilter, Session, Question),
    msg: Message,
) -> HandlerResult {
    let answer = match msg.text() {
        Some(text) => text,
        None => {
            bot.send_message(msg.chat.id, "Please answer using the buttons")
                .await?;
            return Ok(());
        }
    };

    let mut session = session;
    let is_correct = answer == question.correct_name;
    log::debug!(
        "Answer '{}' for flag '{}' -> {}",
        answer,
        question.correct_name,
        is_correct
    );
    session.record_answer(is_correct);

    if is_correct {
        bot.send_message(msg.chat.id, "Correct!").await?;
    } else {
        bot.send_message(
            msg.chat.id,
            format!("Correct Answer: {}", question.correct_name),
        )
        .await?;
    }

    if session.is_complete() {
        let final_score = format!(
            "Quiz finished! You scored {} out of {}\nWhich continent would you like to play next?",
            session.score, session.total_rounds
        );
        bot.send_message(msg.chat.id, final_score.as_str())
            .reply_markup(continent_keyboard(&pool))
            .await?;

        dialogue.update(State::ReceiveContinentChoice).await?;
        return Ok(());
    }

    // Don't ask the same flag twice in a row
    let next_question =
        pool.generate_question(&filter, Some(&question.correct_name), &mut rand::thread_rng())?;
    send_question(&bot, msg.chat.id, &session, &next_question).await?;

    dialogue
        .update(State::FlagQuiz {
            filter,
            session,
            question: next_question,
        })
        .await?;
    Ok(())
}

fn flag_url(code: &str) -> String {
    format!("https://flagcdn.com/w160/{}.png", code)
}

async fn send_question(
    bot: &Bot,
    chat_id: ChatId,
    session: &Session,
    question: &Question,
) -> HandlerResult {
    let keyboard = KeyboardMarkup::new(
        question
            .options
            .iter()
            .map(|option| vec![KeyboardButton::new(option.clone())])
            .collect::<Vec<_>>(),
    );

    // Telegram fetches the image itself; a broken flag URL fails the request
    // and is reported like any other send error
    bot.send_photo(chat_id, InputFile::url(Url::parse(&flag_url(&question.flag_code))?))
        .caption(format!(
            "Question {} of {}: which country does this flag belong to?",
            session.rounds_played + 1,
            session.total_rounds
        ))
        .reply_markup(keyboard)
        .await?;
    Ok(())
}
