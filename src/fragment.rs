//! Renders a [`Response`](crate::response::Response) into APRS message
//! payloads. The protocol ceiling is 67 bytes per payload; tokens are
//! flowed whole where possible, oversized tokens are split on word
//! boundaries, and only a single word longer than the ceiling is ever
//! hard-chopped.

use deunicode::deunicode;

use crate::response::Response;

/// Maximum payload length of an APRS message text.
pub const MAX_PAYLOAD_LEN: usize = 67;

/// Render the response as 1..n payload strings, each at most
/// [`MAX_PAYLOAD_LEN`] bytes. With `force_unicode` unset, all output is
/// reduced to 7-bit ASCII first.
pub fn render(response: &Response, force_unicode: bool) -> Vec<String> {
    let mut fragments: Vec<String> = Vec::new();

    for token in response.tokens() {
        let text = sanitize(&token.text, force_unicode);
        if text.is_empty() {
            continue;
        }
        if text.len() > MAX_PAYLOAD_LEN {
            // Token cannot fit on any fragment; fall back to flowing its
            // words individually, hard-chopping only what still exceeds
            // the ceiling on its own.
            for word in text.split_whitespace() {
                if word.len() > MAX_PAYLOAD_LEN {
                    for chunk in chop(word, MAX_PAYLOAD_LEN) {
                        fragments.push(chunk);
                    }
                } else {
                    append(&mut fragments, word, false);
                }
            }
        } else {
            append(&mut fragments, &text, token.glue);
        }
    }

    fragments
}

/// Remove characters the APRS message format reserves and, unless
/// unicode output was requested, transliterate to ASCII.
fn sanitize(text: &str, force_unicode: bool) -> String {
    let cleaned: String = text.chars().filter(|c| !"{}|~".contains(*c)).collect();
    if force_unicode {
        cleaned
    } else {
        deunicode(&cleaned)
    }
}

fn append(fragments: &mut Vec<String>, token: &str, glue: bool) {
    let Some(current) = fragments.last_mut() else {
        fragments.push(token.to_string());
        return;
    };
    let sep_len = if glue || current.is_empty() { 0 } else { 1 };
    if current.len() + sep_len + token.len() <= MAX_PAYLOAD_LEN {
        if sep_len == 1 {
            current.push(' ');
        }
        current.push_str(token);
    } else {
        fragments.push(token.to_string());
    }
}

/// Split a single oversized word into ceiling-sized chunks, never in the
/// middle of a UTF-8 sequence.
fn chop(word: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        if current.len() + c.len_utf8() > max_len {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_of(tokens: &[&str]) -> Response {
        let mut response = Response::new();
        for token in tokens {
            response.push(*token);
        }
        response
    }

    #[test]
    fn short_tokens_share_a_fragment() {
        let fragments = render(&response_of(&["Hello World", "Wie geht es Dir"]), false);
        assert_eq!(fragments, vec!["Hello World Wie geht es Dir"]);
    }

    #[test]
    fn token_that_does_not_fit_opens_a_new_fragment() {
        let first = "1111111111222222222233333333334444444444555555555566666666";
        let fragments = render(&response_of(&[first, "Hello World !!!!"]), false);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], first);
        assert_eq!(fragments[1], "Hello World !!!!");
    }

    #[test]
    fn every_fragment_respects_the_ceiling() {
        let long = "1111111111 2222222222 3333333333 4444444444 5555555555 6666666666 \
                    7777777777 8888888888 9999999999 0000000000 1111111111 2222222222";
        let fragments = render(&response_of(&[long, "short"]), false);
        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.len() <= MAX_PAYLOAD_LEN, "{:?}", fragment);
        }
    }

    #[test]
    fn single_overlong_word_is_hard_chopped() {
        let word = "a".repeat(150);
        let fragments = render(&response_of(&[&word]), false);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].len(), 67);
        assert_eq!(fragments[1].len(), 67);
        assert_eq!(fragments[2].len(), 16);
    }

    #[test]
    fn glued_token_omits_the_separator() {
        let mut response = Response::new();
        response.push("Rain(mm) 1h=0.5");
        response.push_glued(", 24h=1.2");
        let fragments = render(&response, false);
        assert_eq!(fragments, vec!["Rain(mm) 1h=0.5, 24h=1.2"]);
    }

    #[test]
    fn ascii_mode_transliterates() {
        let fragments = render(&response_of(&["Bedeckt, böig, 3°"]), false);
        for fragment in &fragments {
            assert!(fragment.bytes().all(|b| (0x20..=0x7e).contains(&b)));
        }
        assert!(fragments[0].contains("boig"));
    }

    #[test]
    fn unicode_mode_preserves_text_but_strips_reserved_chars() {
        let fragments = render(&response_of(&["böig{}|~"]), true);
        assert_eq!(fragments, vec!["böig"]);
    }

    #[test]
    fn reserved_characters_are_always_removed() {
        let fragments = render(&response_of(&["a{b}c|d~e"]), false);
        assert_eq!(fragments, vec!["abcde"]);
    }
}
