use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use aether_core::{AgentId, AgentProvider, AgentReply, AgentRequest, ProviderStream};

use crate::chunking::{self, ChunkDelay};

const QUESTION_PREVIEW_CHARS: usize = 50;

const RESEARCHER_SOURCES: [&str; 3] = [
    "research-paper-2024.pdf",
    "industry-report.org",
    "expert-analysis.com",
];

/// Deterministic backend for demos and for exercising the orchestration
/// logic without a real model. Each role has two canned replies keyed by
/// round parity, with the user's question spliced in.
pub struct MockProvider {
    pacing: ChunkDelay,
    call_count: AtomicUsize,
}

impl MockProvider {
    /// Demo pacing: chunks arrive at typing speed.
    pub fn new() -> Self {
        Self::with_pacing(ChunkDelay::Jittered {
            base: Duration::from_millis(15),
            spread: Duration::from_millis(25),
        })
    }

    /// No pacing. Used in tests.
    pub fn instant() -> Self {
        Self::with_pacing(ChunkDelay::None)
    }

    pub fn with_pacing(pacing: ChunkDelay) -> Self {
        Self {
            pacing,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: AgentRequest) -> ProviderStream {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let content = render(request.agent_id, request.round, &request.user_message);
        let sources = (request.agent_id == AgentId::Researcher)
            .then(|| RESEARCHER_SOURCES.iter().map(|s| s.to_string()).collect());

        let reply = AgentReply {
            agent_id: request.agent_id,
            content,
            sources,
        };
        chunking::stream_words(reply, self.pacing)
    }
}

fn render(agent: AgentId, round: u32, question: &str) -> String {
    let options = templates(agent);
    let index = (round.saturating_sub(1) as usize) % options.len();
    let mut content = options[index].replacen("this question", &quoted_question(question), 1);

    if round > 1 {
        content.push_str(&format!(
            "\n\n[Round {round} refinement: Building on previous round's insights to strengthen this response.]"
        ));
    }

    content
}

fn quoted_question(question: &str) -> String {
    let preview: String = question.chars().take(QUESTION_PREVIEW_CHARS).collect();
    let ellipsis = if question.chars().count() > QUESTION_PREVIEW_CHARS {
        "..."
    } else {
        ""
    };
    format!("\"{preview}{ellipsis}\"")
}

fn templates(agent: AgentId) -> [&'static str; 2] {
    match agent {
        AgentId::Coordinator => [
            "I'll coordinate our approach to this question. Here's the plan:\n\n1. Researcher will gather relevant information and evidence\n2. Skeptic will evaluate claims and identify potential issues\n3. Coder will provide technical implementation if needed\n4. Writer will craft a clear, well-structured response\n5. Summarizer will distill our findings into a best answer\n\nLet's work through this methodically.",
            "Breaking down the task for our team:\n\nPrimary objective: Address the user's question comprehensively\nResearch focus: Find authoritative sources and data\nCritical review: Identify assumptions and gaps\nOutput goal: Clear, actionable answer\n\nTeam, let's begin our analysis.",
        ],
        AgentId::Researcher => [
            "Based on my research, here are the key findings:\n\n**Key Evidence:**\n- Multiple authoritative sources confirm the core premise\n- Recent studies show significant developments in this area\n- There are several important nuances to consider\n\n**Supporting Data:**\n- Industry benchmarks suggest a strong trend in this direction\n- Expert consensus aligns with the initial hypothesis\n- Historical patterns provide additional context\n\nI recommend we consider these factors in our final answer.",
            "My investigation reveals several important insights:\n\n1. **Primary Finding:** The evidence strongly supports a comprehensive approach\n2. **Secondary Insight:** There are established best practices we should reference\n3. **Context:** The landscape has evolved significantly in recent years\n\n**Sources consulted:** Academic papers, industry reports, expert analyses\n\nThis forms a solid foundation for our response.",
        ],
        AgentId::Skeptic => [
            "I want to challenge a few assumptions here:\n\n**Potential Issues:**\n- Are we making unverified claims? Some of these need more evidence\n- The scope might be too narrow - there are edge cases to consider\n- Counter-arguments exist that we should acknowledge\n\n**Weaknesses Identified:**\n- The reasoning could be stronger with more concrete examples\n- We should consider alternative perspectives\n- Some conclusions may be premature without more data\n\nLet's strengthen the answer by addressing these points.",
            "Hold on - let me play devil's advocate:\n\n1. **Assumption check:** Not all premises are equally supported\n2. **Bias risk:** We may be favoring one interpretation over valid alternatives\n3. **Completeness:** Several important considerations are being overlooked\n\n**My recommendation:** Acknowledge limitations and present a more balanced view. The strongest answers address counterarguments head-on.",
        ],
        AgentId::Coder => [
            "From a technical perspective, here's what I'd suggest:\n\n```\n// Example implementation approach\nfunction processQuery(input) {\n  // Validate input parameters\n  const validated = validate(input);\n  \n  // Apply core logic\n  const result = analyze(validated);\n  \n  // Return structured output\n  return format(result);\n}\n```\n\n**Technical Notes:**\n- Consider edge cases in implementation\n- Performance should be acceptable for typical use cases\n- The architecture supports future extensibility",
            "Here's the technical breakdown:\n\n**Architecture:**\n- Input processing and validation layer\n- Core business logic implementation\n- Output formatting and delivery\n\n**Implementation considerations:**\n- Error handling should cover common failure modes\n- The solution should be modular and testable\n- Documentation is important for maintainability\n\nThis approach provides a solid technical foundation.",
        ],
        AgentId::Writer => [
            "Let me craft this into a polished response:\n\nThe question at hand deserves a thoughtful, comprehensive answer. Drawing from our team's analysis, several key themes emerge that help illuminate the path forward.\n\nFirst, the evidence supports a nuanced understanding rather than a simple yes-or-no answer. The reality is more layered, requiring us to consider multiple perspectives and their implications.\n\nSecond, practical applications matter. Theory without practice leaves us incomplete, so we should ground our answer in real-world applicability.\n\nFinally, acknowledging what we don't know strengthens, rather than weakens, our credibility.",
            "Here's the refined version of our collective insights:\n\nAt its core, this question touches on fundamental principles that are worth examining carefully. Our analysis reveals both expected patterns and surprising nuances.\n\nThe strength of our answer lies in its balance: we've gathered evidence, challenged assumptions, and synthesized findings into actionable guidance. This isn't just theory - it's grounded in practical reality.\n\nThe key takeaway is that thoughtful analysis, combined with healthy skepticism, produces the most reliable conclusions.",
        ],
        AgentId::Summarizer => [
            "**Best Answer:**\n\nAfter synthesizing input from all agents, here is the refined answer:\n\nThe question has been analyzed from multiple angles - research evidence, critical review, technical feasibility, and clear communication. The consensus points to a comprehensive understanding that balances depth with clarity.\n\n**Key Points:**\n1. The evidence supports a well-reasoned approach\n2. Important caveats and limitations have been identified\n3. Practical implications have been considered\n4. The answer is grounded in verifiable information\n\n**What Changed This Round:**\nThe team refined the initial response by incorporating critical feedback and additional evidence, resulting in a more balanced and thorough answer.",
            "**Summary of Findings:**\n\nOur multi-agent analysis has produced a well-rounded answer that considers:\n\n- **Evidence base:** Strong supporting research and data\n- **Critical review:** Assumptions tested, weaknesses addressed\n- **Technical feasibility:** Practical implementation verified\n- **Communication:** Clear, accessible presentation\n\n**Best Answer:** The combined insights from our team provide a reliable, nuanced response that addresses the question comprehensively while acknowledging appropriate limitations.\n\n**What Changed This Round:**\nIncorporated skeptic feedback to strengthen claims and added technical validation from the coder's analysis.",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::ids::{RoomId, RunId, UserId};
    use aether_core::{ProviderEvent, RunConfig};
    use futures::StreamExt;

    fn request(agent: AgentId, round: u32, question: &str) -> AgentRequest {
        AgentRequest {
            run_id: RunId::new(),
            room_id: RoomId::new(),
            user_id: UserId::new(),
            round,
            agent_id: agent,
            user_message: question.to_string(),
            room_history: vec![],
            prior_summaries: vec![],
            config: RunConfig::default(),
        }
    }

    async fn reply_for(provider: &MockProvider, req: AgentRequest) -> AgentReply {
        let mut stream = provider.generate(req).await;
        let mut done = None;
        while let Some(event) = stream.next().await {
            if let ProviderEvent::Done { reply } = event {
                done = Some(reply);
            }
        }
        done.unwrap()
    }

    #[tokio::test]
    async fn question_is_spliced_into_round_one_template() {
        let provider = MockProvider::instant();
        let reply = reply_for(&provider, request(AgentId::Coordinator, 1, "What is X?")).await;
        assert!(reply
            .content
            .starts_with("I'll coordinate our approach to \"What is X?\"."));
    }

    #[tokio::test]
    async fn templates_alternate_by_round_parity() {
        let provider = MockProvider::instant();

        let odd = reply_for(&provider, request(AgentId::Coordinator, 1, "q")).await;
        let even = reply_for(&provider, request(AgentId::Coordinator, 2, "q")).await;
        let third = reply_for(&provider, request(AgentId::Coordinator, 3, "q")).await;

        assert!(odd.content.starts_with("I'll coordinate"));
        assert!(even.content.starts_with("Breaking down the task"));
        assert!(third.content.starts_with("I'll coordinate"));
    }

    #[tokio::test]
    async fn long_questions_are_previewed() {
        let provider = MockProvider::instant();
        let question = "a".repeat(60);
        let reply = reply_for(&provider, request(AgentId::Coordinator, 1, &question)).await;

        let expected = format!("\"{}...\"", "a".repeat(50));
        assert!(reply.content.contains(&expected));
        assert!(!reply.content.contains(&question));
    }

    #[tokio::test]
    async fn later_rounds_get_refinement_note() {
        let provider = MockProvider::instant();

        let first = reply_for(&provider, request(AgentId::Writer, 1, "q")).await;
        assert!(!first.content.contains("refinement"));

        let second = reply_for(&provider, request(AgentId::Writer, 2, "q")).await;
        assert!(second.content.ends_with(
            "[Round 2 refinement: Building on previous round's insights to strengthen this response.]"
        ));
    }

    #[tokio::test]
    async fn only_researcher_cites_sources() {
        let provider = MockProvider::instant();

        let researcher = reply_for(&provider, request(AgentId::Researcher, 1, "q")).await;
        assert_eq!(
            researcher.sources,
            Some(RESEARCHER_SOURCES.iter().map(|s| s.to_string()).collect())
        );

        let skeptic = reply_for(&provider, request(AgentId::Skeptic, 1, "q")).await;
        assert!(skeptic.sources.is_none());
    }

    #[tokio::test]
    async fn chunks_concatenate_to_reply_content() {
        let provider = MockProvider::instant();
        let mut stream = provider.generate(request(AgentId::Summarizer, 1, "q")).await;

        let mut streamed = String::new();
        let mut done = None;
        while let Some(event) = stream.next().await {
            match event {
                ProviderEvent::Chunk { text } => streamed.push_str(&text),
                ProviderEvent::Done { reply } => done = Some(reply.content),
            }
        }
        assert_eq!(Some(streamed), done);
    }

    #[tokio::test]
    async fn every_role_renders_both_templates() {
        let provider = MockProvider::instant();
        for agent in AgentId::ALL {
            for round in [1, 2] {
                let reply = reply_for(&provider, request(agent, round, "q")).await;
                assert!(!reply.content.is_empty(), "{agent} round {round} was empty");
            }
        }
        assert_eq!(provider.call_count(), 12);
    }
}
