//! Thread to prompt projection.
//!
//! Each event renders as a block tagged with its event type, in event order.
//! Appending an event only ever appends one block, so a resumed thread sees
//! exactly the framing it was suspended with. Bump [`PROMPT_FORMAT`] when a
//! template changes.

use std::fmt::Write;

use crate::decision::Decision;
use crate::event::{EmailPayload, Event, EventData};
use crate::thread::Thread;

/// Version of the rendering templates below.
pub const PROMPT_FORMAT: u32 = 1;

/// Render the whole thread for the oracle.
pub fn project(thread: &Thread) -> String {
    thread.events.iter().map(render_event).collect()
}

/// Render one event as a tagged block, terminated by a blank line.
pub fn render_event(event: &Event) -> String {
    let tag = event.kind.as_str();
    format!("<{tag}>\n{}\n</{tag}>\n\n", render_data(&event.data))
}

fn render_data(data: &EventData) -> String {
    match data {
        EventData::Email(email) => render_email(email),
        EventData::HumanMessage { message } => format!("Message: {message}"),
        EventData::Decision(decision) => render_decision(decision),
        EventData::Text(text) => text.clone(),
        EventData::ToolResult(value) => value.to_string(),
    }
}

fn render_email(email: &EmailPayload) -> String {
    let mut out = format!(
        "From: {}\nTo: {}\nSubject: {}\nBody: {}",
        email.from_address, email.to_address, email.subject, email.body
    );

    if !email.previous_thread.is_empty() {
        out.push_str("\nPrevious Thread:");
        for msg in &email.previous_thread {
            // Writing to a String cannot fail.
            let _ = write!(
                out,
                "\n- From: {}\n  Date: {}\n  Subject: {}\n  {}",
                msg.from_address, msg.datetime, msg.subject, msg.content
            );
        }
    }

    out
}

fn render_decision(decision: &Decision) -> String {
    match decision {
        Decision::RequestMoreInformation { message } => format!("Message: {message}"),
        Decision::CreateIssue { issue } => format!(
            "Title: {}\nDescription: {}\nTeam ID: {}",
            issue.title, issue.description, issue.team_id
        ),
        Decision::ListIssues { from_time, to_time } => format!(
            "From: {}\nTo: {}",
            from_time.as_deref().unwrap_or("any"),
            to_time.as_deref().unwrap_or("any")
        ),
        Decision::ListTeams {} => "All teams".to_string(),
        Decision::DoneForNow { message } => format!("Message: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ApprovalFunction;
    use crate::event::EmailMessage;
    use crate::issue::IssueDraft;
    use serde_json::json;

    fn email() -> EmailPayload {
        EmailPayload {
            from_address: "dana@example.com".into(),
            to_address: "assistant@example.com".into(),
            subject: "Login broken".into(),
            body: "Cannot log in".into(),
            message_id: "<m1@mail>".into(),
            previous_thread: vec![],
            raw_email: String::new(),
            is_test: None,
        }
    }

    #[test]
    fn test_email_template() {
        let thread = Thread::new(email());
        assert_eq!(
            project(&thread),
            "<email_received>\n\
             From: dana@example.com\n\
             To: assistant@example.com\n\
             Subject: Login broken\n\
             Body: Cannot log in\n\
             </email_received>\n\n"
        );
    }

    #[test]
    fn test_previous_thread_rendered_after_body() {
        let mut payload = email();
        payload.previous_thread.push(EmailMessage {
            from_address: "ops@example.com".into(),
            to_address: vec![],
            cc_address: vec![],
            subject: "Re: Login".into(),
            content: "Did you reset?".into(),
            datetime: "2024-05-01".into(),
        });
        let text = render_event(&Event::email_received(payload));
        let body = text.find("Body: Cannot log in").unwrap();
        let previous = text.find("Previous Thread:").unwrap();
        assert!(previous > body);
        assert!(text.contains("- From: ops@example.com\n  Date: 2024-05-01"));
    }

    #[test]
    fn test_create_issue_template() {
        let event = Event::decision(Decision::CreateIssue {
            issue: IssueDraft {
                title: "Bug X".into(),
                description: "Login fails".into(),
                team_id: "T1".into(),
            },
        });
        assert_eq!(
            render_event(&event),
            "<create_issue>\nTitle: Bug X\nDescription: Login fails\nTeam ID: T1\n</create_issue>\n\n"
        );
    }

    #[test]
    fn test_result_and_text_templates() {
        let result = Event::list_teams_result(json!([{"id": "T1", "name": "Eng"}]));
        assert_eq!(
            render_event(&result),
            "<list_teams_result>\n[{\"id\":\"T1\",\"name\":\"Eng\"}]\n</list_teams_result>\n\n"
        );

        let denial = Event::denial(ApprovalFunction::CreateIssue, Some("not now"));
        assert_eq!(
            render_event(&denial),
            "<human_response>\nUser denied create_issue with feedback: not now\n</human_response>\n\n"
        );

        let reply = Event::human_response("It is the web app");
        assert_eq!(
            render_event(&reply),
            "<human_response>\nMessage: It is the web app\n</human_response>\n\n"
        );
    }

    #[test]
    fn test_projection_is_deterministic() {
        let mut thread = Thread::new(email());
        thread.push(Event::decision(Decision::ListIssues {
            from_time: Some("2024-01-01".into()),
            to_time: None,
        }));
        assert_eq!(project(&thread), project(&thread));
        assert!(project(&thread).contains("From: 2024-01-01\nTo: any"));
    }

    #[test]
    fn test_appending_only_adds_trailing_block() {
        let mut thread = Thread::new(email());
        let before = project(&thread);

        let event = Event::decision(Decision::DoneForNow {
            message: "All set".into(),
        });
        thread.push(event.clone());
        let after = project(&thread);

        assert!(after.starts_with(&before));
        assert_eq!(&after[before.len()..], render_event(&event));
    }
}
