//! Sequential three-analyst pipeline.
//!
//! A financial analyst summarizes the document context, a risk specialist
//! assesses the analyst's findings, and an investment advisor turns both into
//! a recommendation, optionally drawing on external market context. Each stage
//! is one [`TextGenerator`] call and sees the outputs of the stages before it.

use std::sync::Arc;

use finrag::Result;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info, info_span};

use crate::generation::{GenerationRequest, TextGenerator};

/// The persona a stage's model call speaks as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agent {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl Agent {
    fn system_prompt(&self) -> String {
        format!("You are a {}.\n{}\n\nYour goal: {}", self.role, self.backstory, self.goal)
    }
}

pub const FINANCIAL_ANALYST: Agent = Agent {
    role: "Senior Financial Analyst",
    goal: "Extract and summarize financial performance strictly from provided document context.",
    backstory: "You are an institutional-grade financial analyst. \
                You rely strictly on document-derived data and never fabricate numbers.",
};

pub const RISK_ANALYST: Agent = Agent {
    role: "Financial Risk Specialist",
    goal: "Identify financial and operational risks based strictly on financial findings.",
    backstory: "You specialize in liquidity risk, profitability pressure, \
                operational exposure, and revenue sustainability.",
};

pub const INVESTMENT_ADVISOR: Agent = Agent {
    role: "Investment Strategy Advisor",
    goal: "Provide disciplined investment recommendations using financial analysis \
           and external market context if provided.",
    backstory: "You provide balanced Buy/Hold/Sell recommendations. \
                If the context contains External Market Data, you must incorporate it \
                under the section 'External Market Insights'.",
};

/// One step of the pipeline: who answers, what they are asked, and what shape
/// the answer should take.
///
/// `description` may reference `{query}`, `{document_context}` and
/// `{external_context}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub agent: Agent,
    pub description: &'static str,
    pub expected_output: &'static str,
}

pub const FINANCIAL_ANALYSIS: Stage = Stage {
    name: "financial_analysis",
    agent: FINANCIAL_ANALYST,
    description: "Document Context:
{document_context}

User Query:
{query}

Provide a structured financial analysis including:

1. Revenue performance
2. Profitability
3. Liquidity position
4. Operational highlights

Rules:
- Use ONLY Document Context.
- Do NOT fabricate numbers.
- If required information is missing, state clearly.",
    expected_output: "Structured report with headings:
- Financial Performance
- Profitability
- Liquidity Position
- Operational Summary",
};

pub const RISK_ASSESSMENT: Stage = Stage {
    name: "risk_assessment",
    agent: RISK_ANALYST,
    description: "Using the financial analysis from the previous step:

Identify:
- Liquidity risks
- Profitability risks
- Operational risks
- Revenue sustainability risks

Base everything strictly on the financial analysis.
Do not introduce new facts.",
    expected_output: "Structured risk report with sections:
- Liquidity Risk
- Profitability Risk
- Operational Risk
- Revenue Sustainability Risk",
};

pub const INVESTMENT_RECOMMENDATION: Stage = Stage {
    name: "investment_recommendation",
    agent: INVESTMENT_ADVISOR,
    description: "Document Context:
{document_context}

External Market Context:
{external_context}

Using:

1. Financial Analysis
2. Risk Assessment
3. External Market Context (if provided)

Provide:

A. Investment Recommendation (Buy / Hold / Sell)
B. Supporting Financial Rationale
C. Risk-Adjusted Perspective

If External Market Context is not empty:
- Summarize it under:
  \"External Market Insights\"

If it is empty:
- State: \"No external market data available.\"

Keep document-derived insights separate from external insights.
Do not fabricate statistics.",
    expected_output: "Structured investment report including:

- Investment Recommendation
- Financial Justification
- Risk Summary
- External Market Insights",
};

/// The three stages, in execution order.
pub const STAGES: [Stage; 3] = [FINANCIAL_ANALYSIS, RISK_ASSESSMENT, INVESTMENT_RECOMMENDATION];

/// What the pipeline is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub query: String,
    pub document_context: String,
    pub external_context: String,
}

/// The output of every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub financial_analysis: String,
    pub risk_assessment: String,
    pub recommendation: String,
}

/// Runs [`STAGES`] one after another against a [`TextGenerator`].
pub struct AnalysisPipeline {
    generator: Arc<dyn TextGenerator>,
}

impl AnalysisPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Run all stages. The first failing stage aborts the pipeline.
    pub async fn run(&self, input: &AnalysisInput) -> Result<AnalysisReport> {
        let mut previous: Vec<(&Stage, String)> = Vec::with_capacity(STAGES.len());

        let financial_analysis = self.run_stage(&FINANCIAL_ANALYSIS, input, &mut previous).await?;
        let risk_assessment = self.run_stage(&RISK_ASSESSMENT, input, &mut previous).await?;
        let recommendation =
            self.run_stage(&INVESTMENT_RECOMMENDATION, input, &mut previous).await?;

        Ok(AnalysisReport { financial_analysis, risk_assessment, recommendation })
    }

    async fn run_stage<'s>(
        &self,
        stage: &'s Stage,
        input: &AnalysisInput,
        previous: &mut Vec<(&'s Stage, String)>,
    ) -> Result<String> {
        let request = build_request(stage, input, previous);
        let span = info_span!("stage", name = stage.name, agent = stage.agent.role);
        let output = self.generator.generate(&request).instrument(span).await?;
        info!(stage = stage.name, output_len = output.len(), "stage completed");
        previous.push((stage, output.clone()));
        Ok(output)
    }
}

/// Fill a stage's template and append the earlier stages' outputs.
pub fn build_request(
    stage: &Stage,
    input: &AnalysisInput,
    previous: &[(&Stage, String)],
) -> GenerationRequest {
    let mut prompt = stage
        .description
        .replace("{query}", &input.query)
        .replace("{document_context}", &input.document_context)
        .replace("{external_context}", &input.external_context);

    if !previous.is_empty() {
        prompt.push_str("\n\nContext from previous steps:");
        for (earlier, output) in previous {
            let role = earlier.agent.role;
            prompt.push_str(&format!("\n\n## {} ({role})\n{output}", earlier.name));
        }
    }

    prompt.push_str("\n\nExpected output:\n");
    prompt.push_str(stage.expected_output);

    GenerationRequest { system: stage.agent.system_prompt(), prompt }
}
