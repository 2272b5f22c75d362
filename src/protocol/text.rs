use super::{ProtocolError, Reply, Request};

const OK: &str = "ok";
const FAIL: &str = "fail: ";

pub(super) fn encode_request(request: &Request) -> String {
    match request {
        Request::AddTask { url } => format!("task {url}"),
        Request::Status => "status".to_string(),
        Request::Stop => "stop".to_string(),
        Request::Done => "done".to_string(),
    }
}

pub(super) fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or(ProtocolError::Empty)?;
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("task", [url]) => Ok(Request::AddTask {
            url: url.to_string(),
        }),
        ("task", _) => Err(ProtocolError::InvalidArguments(
            "task expects exactly one URL",
        )),
        ("status", []) => Ok(Request::Status),
        ("stop", []) => Ok(Request::Stop),
        ("done", []) => Ok(Request::Done),
        ("status" | "stop" | "done", _) => Err(ProtocolError::InvalidArguments(
            "command takes no arguments",
        )),
        (other, _) => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

pub(super) fn encode_reply(reply: &Reply) -> String {
    match reply {
        Reply::Ok => OK.to_string(),
        Reply::Status { stat } => format!("{OK} {stat}"),
        Reply::Fail { reason } => {
            // The reply must stay on one line and inside its quotes.
            let reason: String = reason
                .chars()
                .map(|c| match c {
                    '\n' | '\r' => ' ',
                    '"' => '\'',
                    c => c,
                })
                .collect();
            format!("{FAIL}\"{reason}\"")
        }
    }
}

pub(super) fn decode_reply(line: &str) -> Result<Reply, ProtocolError> {
    let line = line.trim();
    if line == OK {
        return Ok(Reply::Ok);
    }
    if let Some(payload) = line.strip_prefix("ok ") {
        return Ok(Reply::Status {
            stat: payload.parse()?,
        });
    }
    if let Some(reason) = line.strip_prefix(FAIL) {
        let reason = reason
            .strip_prefix('"')
            .and_then(|reason| reason.strip_suffix('"'))
            .unwrap_or(reason);
        return Ok(Reply::fail(reason));
    }
    Err(ProtocolError::MalformedReply(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatSnapshot;

    #[test]
    fn parses_commands() {
        assert_eq!(decode_request("status").unwrap(), Request::Status);
        assert_eq!(decode_request("stop").unwrap(), Request::Stop);
        assert_eq!(decode_request("done").unwrap(), Request::Done);
        assert_eq!(
            decode_request("task http://example.com/live").unwrap(),
            Request::AddTask {
                url: "http://example.com/live".into()
            }
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(matches!(decode_request(""), Err(ProtocolError::Empty)));
        assert!(matches!(decode_request("   "), Err(ProtocolError::Empty)));
        assert!(matches!(
            decode_request("fetch http://x"),
            Err(ProtocolError::UnknownCommand(cmd)) if cmd == "fetch"
        ));
        assert!(matches!(
            decode_request("task"),
            Err(ProtocolError::InvalidArguments(_))
        ));
        assert!(matches!(
            decode_request("task http://a http://b"),
            Err(ProtocolError::InvalidArguments(_))
        ));
        assert!(matches!(
            decode_request("stop now"),
            Err(ProtocolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn renders_replies() {
        assert_eq!(encode_reply(&Reply::Ok), "ok");
        assert_eq!(
            encode_reply(&Reply::Status {
                stat: StatSnapshot::new(0, 1, 1)
            }),
            "ok active:0,failed:1,pending:1"
        );
        assert_eq!(
            encode_reply(&Reply::fail("Cannot recognize command")),
            "fail: \"Cannot recognize command\""
        );
    }

    #[test]
    fn failure_reason_stays_on_one_line() {
        let line = encode_reply(&Reply::fail("bad \"input\"\nhere"));
        assert_eq!(line, "fail: \"bad 'input' here\"");
        assert_eq!(decode_reply(&line).unwrap(), Reply::fail("bad 'input' here"));
    }

    #[test]
    fn parses_replies() {
        assert_eq!(decode_reply("ok").unwrap(), Reply::Ok);
        assert_eq!(
            decode_reply("ok active:1,failed:0,pending:0").unwrap(),
            Reply::Status {
                stat: StatSnapshot::new(1, 0, 0)
            }
        );
        assert!(matches!(
            decode_reply("huh"),
            Err(ProtocolError::MalformedReply(_))
        ));
        assert!(matches!(
            decode_reply("ok garbage"),
            Err(ProtocolError::Statistics(_))
        ));
    }
}
