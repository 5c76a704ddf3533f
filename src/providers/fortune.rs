//! Magic-8-ball style fortune teller. Picks one of the twenty canned
//! answers; the only provider that cannot fail.

use rand::seq::SliceRandom;

const ANSWERS: &[&str] = &[
    "It is certain",
    "It is decidedly so",
    "Without a doubt",
    "Yes definitely",
    "You may rely on it",
    "As I see it, yes",
    "Most likely",
    "Outlook good",
    "Yes",
    "Signs point to yes",
    "Reply hazy, try again",
    "Ask again later",
    "Better not tell you now",
    "Cannot predict now",
    "Concentrate and ask again",
    "Don't count on it",
    "My reply is no",
    "My sources say no",
    "Outlook not so good",
    "Very doubtful",
];

pub fn tell_fortune() -> String {
    ANSWERS
        .choose(&mut rand::thread_rng())
        .expect("answer table is non-empty")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fortune_is_one_of_the_canned_answers() {
        for _ in 0..20 {
            let answer = tell_fortune();
            assert!(ANSWERS.contains(&answer.as_str()));
            assert!(answer.len() <= 67);
        }
    }
}
