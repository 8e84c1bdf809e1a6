//! Reply parsing: splitting model output into text and tool calls.
//!
//! Two surface forms carry tool calls:
//!
//! ````text
//! ```xanadu
//! echo one
//! echo two
//! ```
//! ````
//!
//! where every non-blank line inside the fence is one call, and a single
//! `xanadu: <command>` line anywhere outside a fence. Other fences are kept
//! as text.

use xanadu_terminal::capture::TOOL_NAME;

const FENCE: &str = "```";

/// A run of reply content, in reply order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Tools(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyParse {
    pub segments: Vec<Segment>,
    /// Every call across all tool segments, in order.
    pub tool_calls: Vec<String>,
    /// A fence was still open at the end of the reply.
    pub incomplete: bool,
}

impl ReplyParse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// `xanadu: <command>` with a non-blank command.
fn single_line_call(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix(TOOL_NAME)?;
    let call = rest.trim_start().strip_prefix(':')?.trim();
    (!call.is_empty()).then_some(call)
}

fn is_tool_fence(opener: &str) -> bool {
    opener
        .trim()
        .strip_prefix(FENCE)
        .is_some_and(|tag| tag.eq_ignore_ascii_case(TOOL_NAME))
}

#[derive(Default)]
struct Builder {
    parse: ReplyParse,
    text: Vec<String>,
}

impl Builder {
    fn flush_text(&mut self) {
        let joined = self.text.join("\n");
        self.text.clear();
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            self.parse.segments.push(Segment::Text(trimmed.to_string()));
        }
    }

    fn push_tools(&mut self, lines: Vec<String>) {
        if lines.is_empty() {
            return;
        }
        self.parse.tool_calls.extend(lines.iter().cloned());
        self.parse.segments.push(Segment::Tools(lines));
    }
}

/// Split a (normalized) reply into segments.
pub fn parse_reply(reply: &str) -> ReplyParse {
    let mut b = Builder::default();
    let mut fence: Option<(bool, Vec<String>)> = None;

    for line in reply.lines() {
        if line.starts_with(FENCE) {
            match fence.take() {
                Some((true, body)) => {
                    let calls = body
                        .iter()
                        .map(|l| l.trim())
                        .filter(|l| !l.is_empty())
                        .map(String::from)
                        .collect();
                    b.push_tools(calls);
                },
                Some((false, body)) => b.text.extend(body),
                None => {
                    b.flush_text();
                    fence = Some((is_tool_fence(line), Vec::new()));
                },
            }
            continue;
        }
        if let Some((_, body)) = fence.as_mut() {
            body.push(line.to_string());
            continue;
        }
        if let Some(call) = single_line_call(line) {
            b.flush_text();
            b.push_tools(vec![call.to_string()]);
            continue;
        }
        b.text.push(line.to_string());
    }

    if fence.is_some() {
        b.parse.incomplete = true;
        return b.parse;
    }
    b.flush_text();
    b.parse
}

/// Emit `calls` as a tool fence that parses back to the same calls.
///
/// Calls are expected to be single, trimmed, non-blank lines.
pub fn format_tool_block(calls: &[String]) -> String {
    let mut block = format!("{FENCE}{TOOL_NAME}\n");
    for call in calls {
        block.push_str(call);
        block.push('\n');
    }
    block.push_str(FENCE);
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calls(parse: &ReplyParse) -> Vec<&str> {
        parse.tool_calls.iter().map(String::as_str).collect()
    }

    #[test]
    fn plain_text_only() {
        let parse = parse_reply("Hello there.\n\nSecond paragraph.\n");
        assert!(!parse.has_tool_calls());
        assert!(!parse.incomplete);
        assert_eq!(
            parse.segments,
            vec![Segment::Text("Hello there.\n\nSecond paragraph.".into())]
        );
    }

    #[test]
    fn fenced_block_with_text_around() {
        let parse = parse_reply("First I list.\n```xanadu\nmacros\n\n  echo hi  \n```\nDone.");
        assert_eq!(calls(&parse), vec!["macros", "echo hi"]);
        assert_eq!(
            parse.segments,
            vec![
                Segment::Text("First I list.".into()),
                Segment::Tools(vec!["macros".into(), "echo hi".into()]),
                Segment::Text("Done.".into()),
            ]
        );
    }

    #[test]
    fn fence_tag_is_case_insensitive() {
        let parse = parse_reply("```XANADU\necho hi\n```");
        assert_eq!(calls(&parse), vec!["echo hi"]);
    }

    #[test]
    fn single_line_calls() {
        let parse = parse_reply("Let me check.\n  xanadu : help echo\nxanadu:\nxanadufoo: no");
        assert_eq!(calls(&parse), vec!["help echo"]);
        assert_eq!(
            parse.segments,
            vec![
                Segment::Text("Let me check.".into()),
                Segment::Tools(vec!["help echo".into()]),
                Segment::Text("xanadu:\nxanadufoo: no".into()),
            ]
        );
    }

    #[test]
    fn other_fences_stay_text() {
        let parse = parse_reply("Example:\n```sql\nselect 1;\n```\nxanadu: echo ok");
        assert_eq!(calls(&parse), vec!["echo ok"]);
        assert_eq!(
            parse.segments,
            vec![
                Segment::Text("Example:".into()),
                Segment::Text("select 1;".into()),
                Segment::Tools(vec!["echo ok".into()]),
            ]
        );
    }

    #[test]
    fn calls_inside_other_fences_are_ignored() {
        let parse = parse_reply("```\nxanadu: echo no\n```");
        assert!(!parse.has_tool_calls());
    }

    #[test]
    fn unterminated_fence_is_incomplete() {
        let parse = parse_reply("Working.\n```xanadu\necho a");
        assert!(parse.incomplete);
        assert!(!parse.has_tool_calls());
    }

    #[test]
    fn empty_tool_fence_adds_nothing() {
        let parse = parse_reply("```xanadu\n\n```");
        assert!(parse.segments.is_empty());
        assert!(!parse.incomplete);
    }

    #[test]
    fn formatted_block_shape() {
        let block = format_tool_block(&["echo a".into(), "select *".into(), "from t;".into()]);
        assert_eq!(block, "```xanadu\necho a\nselect *\nfrom t;\n```");
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_call() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9 ;:$*'\"]{0,24}[a-z0-9;]"
        }

        proptest! {
            #[test]
            fn tool_block_round_trips(
                calls in proptest::collection::vec(arb_call(), 1..8),
                before in "[A-Za-z .]{0,30}",
            ) {
                let reply = format!("{before}\n{}\n", format_tool_block(&calls));
                let parse = parse_reply(&reply);
                prop_assert!(!parse.incomplete);
                prop_assert_eq!(parse.tool_calls, calls);
            }

            #[test]
            fn parse_never_panics(reply in "(?s).{0,200}") {
                let _ = parse_reply(&reply);
            }
        }
    }
}
