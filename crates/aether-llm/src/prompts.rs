//! Role prompt text and context assembly shared by the backends.
//!
//! Each backend formats its own request, but the context windows are
//! common: the last [`SUMMARY_WINDOW`] round summaries and the last
//! [`HISTORY_WINDOW`] lines of room discussion.

use aether_core::{AgentId, AgentRequest};

/// How many prior round summaries are carried into a prompt.
pub const SUMMARY_WINDOW: usize = 2;

/// How many room-history lines are carried into a prompt.
pub const HISTORY_WINDOW: usize = 8;

/// Full system prompt for chat-style backends.
pub fn system_prompt(agent: AgentId) -> &'static str {
    match agent {
        AgentId::Coordinator => "You are the Coordinator agent. Your role is to organize the team's approach, assign focus areas to other agents, and set the direction for the discussion. Be concise and directive. Structure your response as a brief plan of attack.",
        AgentId::Researcher => "You are the Researcher agent. Your role is to gather facts, evidence, and data. Provide specific information, statistics, and references relevant to the question. Be thorough but focused.",
        AgentId::Skeptic => "You are the Skeptic agent. Your role is to challenge assumptions, identify weaknesses in reasoning, and point out potential issues or counterarguments. Be constructive but critical.",
        AgentId::Coder => "You are the Coder agent. Your role is to provide technical analysis, code examples, implementation details, and architectural considerations. Use code blocks when showing examples.",
        AgentId::Writer => "You are the Writer agent. Your role is to craft clear, well-structured prose from the discussion findings. Focus on readability and organization.",
        AgentId::Summarizer => "You are the Summarizer agent. Your role is to synthesize all contributions from other agents into a single, comprehensive best answer. Combine the key insights from each agent into a cohesive response.",
    }
}

/// One-line role description for backends that take a single flat prompt.
pub fn role_line(agent: AgentId) -> &'static str {
    match agent {
        AgentId::Coordinator => "Coordinator: You organize the team's approach and assign focus areas.",
        AgentId::Researcher => "Researcher: You gather facts, evidence, and data from reliable sources.",
        AgentId::Skeptic => "Skeptic: You challenge assumptions and identify weaknesses in reasoning.",
        AgentId::Coder => "Coder: You provide technical analysis, code examples, and implementation details.",
        AgentId::Writer => "Writer: You craft clear, well-structured prose from the findings.",
        AgentId::Summarizer => "Summarizer: You synthesize all contributions into a final best answer.",
    }
}

/// User-turn content for chat-style backends (system prompt sent separately).
pub fn chat_user_prompt(request: &AgentRequest) -> String {
    let mut content = String::new();

    if !request.prior_summaries.is_empty() {
        content.push_str(&format!(
            "Previous round summaries:\n{}\n\n",
            tail(&request.prior_summaries, SUMMARY_WINDOW).join("\n---\n")
        ));
    }

    if !request.room_history.is_empty() {
        content.push_str(&format!(
            "Discussion so far:\n{}\n\n",
            tail(&request.room_history, HISTORY_WINDOW).join("\n")
        ));
    }

    content.push_str(&format!(
        "User Question: {}\n\nRespond in your role. Be specific, helpful, and concise.",
        request.user_message
    ));

    content
}

/// Single flat prompt for webhook-style backends.
pub fn flat_prompt(request: &AgentRequest) -> String {
    let agent = request.agent_id;
    let mut prompt = format!(
        "You are the {agent} agent in a multi-agent discussion.\n{}\n\n",
        role_line(agent)
    );

    if !request.prior_summaries.is_empty() {
        prompt.push_str(&format!(
            "Previous summaries:\n{}\n\n",
            tail(&request.prior_summaries, SUMMARY_WINDOW).join("\n---\n")
        ));
    }

    if !request.room_history.is_empty() {
        prompt.push_str(&format!(
            "Recent discussion:\n{}\n\n",
            tail(&request.room_history, HISTORY_WINDOW).join("\n")
        ));
    }

    prompt.push_str(&format!(
        "User Question: {}\n\nRespond in your role as {agent}. Be specific and helpful.",
        request.user_message
    ));

    prompt
}

fn tail(lines: &[String], window: usize) -> &[String] {
    &lines[lines.len().saturating_sub(window)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::ids::{RoomId, RunId, UserId};
    use aether_core::RunConfig;

    fn request(agent: AgentId) -> AgentRequest {
        AgentRequest {
            run_id: RunId::new(),
            room_id: RoomId::new(),
            user_id: UserId::new(),
            round: 1,
            agent_id: agent,
            user_message: "What is Rust?".to_string(),
            room_history: Vec::new(),
            prior_summaries: Vec::new(),
            config: RunConfig::default(),
        }
    }

    #[test]
    fn every_agent_has_prompt_text() {
        for agent in AgentId::ALL {
            assert!(system_prompt(agent).starts_with(&format!(
                "You are the {} agent.",
                agent.display_name()
            )));
            assert!(role_line(agent).starts_with(agent.display_name()));
        }
    }

    #[test]
    fn chat_prompt_without_context_is_just_the_question() {
        let prompt = chat_user_prompt(&request(AgentId::Researcher));
        assert!(prompt.starts_with("User Question: What is Rust?"));
        assert!(!prompt.contains("Previous round summaries"));
        assert!(!prompt.contains("Discussion so far"));
    }

    #[test]
    fn chat_prompt_includes_windowed_context() {
        let mut req = request(AgentId::Writer);
        req.prior_summaries = (1..=4).map(|i| format!("summary {i}")).collect();
        req.room_history = (1..=12).map(|i| format!("[user]: line {i}")).collect();

        let prompt = chat_user_prompt(&req);
        assert!(prompt.contains("Previous round summaries:\nsummary 3\n---\nsummary 4\n\n"));
        assert!(prompt.contains("Discussion so far:\n[user]: line 5\n"));
        assert!(!prompt.contains("line 4\n"));
        assert!(prompt.ends_with("Be specific, helpful, and concise."));
    }

    #[test]
    fn flat_prompt_names_the_role_twice() {
        let prompt = flat_prompt(&request(AgentId::Skeptic));
        assert!(prompt.starts_with("You are the skeptic agent in a multi-agent discussion.\n"));
        assert!(prompt.contains("Skeptic: You challenge assumptions"));
        assert!(prompt.ends_with("Respond in your role as skeptic. Be specific and helpful."));
    }

    #[test]
    fn flat_prompt_uses_its_own_section_headers() {
        let mut req = request(AgentId::Coder);
        req.prior_summaries = vec!["earlier".to_string()];
        req.room_history = vec!["[user]: hi".to_string()];

        let prompt = flat_prompt(&req);
        assert!(prompt.contains("Previous summaries:\nearlier\n\n"));
        assert!(prompt.contains("Recent discussion:\n[user]: hi\n\n"));
    }
}
