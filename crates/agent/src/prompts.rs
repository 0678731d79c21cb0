//! Prompt text for the conversational workflow. Placeholders in braces are
//! substituted at call sites with plain string replacement.

pub const SYSTEM_PROMPT: &str = "\
You are an AI-powered customer support agent designed to provide helpful, accurate, and friendly assistance.

Your capabilities include:
1. Answering questions about products, services, policies, and procedures
2. Troubleshooting technical issues
3. Processing refunds, exchanges, and other customer service requests
4. Escalating complex issues to human support agents when necessary
5. Using tools to look up information, perform calculations, and take actions

Guidelines:
- Be friendly, professional, and empathetic at all times
- Focus on resolving the customer's issue efficiently
- Ask clarifying questions when necessary
- Provide step-by-step instructions for complex procedures
- When using technical terms, explain them clearly
- Respect customer privacy and data security
- If you don't know something, admit it and offer to find out
- Only escalate to a human when truly necessary

If the customer's request is outside your capabilities or if you're not confident in your answer, acknowledge your limitations and offer to connect them with a human support agent.

When using tools:
1. Always choose the most appropriate tool for the task
2. Provide clear explanations of what you're doing
3. Report back with results in a user-friendly way

Remember that your goal is to provide an excellent customer experience while efficiently resolving their issues.";

/// Appended to the system prompt when tools are registered. The workflow
/// detects the JSON shape in the model's reply to decide whether to run
/// tools before answering.
pub const TOOL_CALL_INSTRUCTIONS: &str = "\
You have access to the following tools:
{tool_list}

If the request requires one or more tools, reply with ONLY a JSON object of the form:
{\"tool_calls\": [{\"tool\": \"<name>\", \"input\": {...}}]}

If no tool is needed, reply with your answer as plain text.";

pub const EVALUATION_PROMPT: &str = "\
You are a quality assurance evaluator for an AI customer support agent. Your task is to evaluate the agent's response based on the following criteria:

1. Accuracy: Does the response correctly answer the question or address the issue?
2. Completeness: Does the response fully address all aspects of the question/issue?
3. Clarity: Is the response clear and easy to understand?
4. Helpfulness: Does the response provide useful information or actionable steps?
5. Tone: Is the response friendly, professional, and empathetic?

Provide a confidence score between 0 and 1 (where 1 is highest confidence) for the response.

Response to evaluate:
{response}

User query:
{query}

Evaluation:
- Accuracy score (0-1):
- Completeness score (0-1):
- Clarity score (0-1):
- Helpfulness score (0-1):
- Tone score (0-1):

Overall confidence score: [calculate average]

Does this response require human review? (Yes/No)
[Answer Yes if the overall score is below 0.7 or if the accuracy score is below 0.6]";

pub const TOOL_RESPONSE_PROMPT: &str = "\
Based on the user's query and the results from the tools you've used, compose a helpful response.

User query:
{user_query}

Tool results:
{tool_results}

Compose a response that:
1. Addresses the user's query directly
2. Incorporates the relevant information from the tool results
3. Is friendly, professional, and easy to understand
4. Provides next steps if applicable

Your response:";

pub const HUMAN_ESCALATION_PROMPT: &str = "\
I need to escalate this query to a human support agent. Please compose a message that:

1. Acknowledges the user's query
2. Explains why I'm escalating to a human agent
3. Sets expectations for what happens next
4. Is empathetic and professional

User query:
{user_query}

Reason for escalation:
{escalation_reason}

Escalation message:";

pub const SENTIMENT_PROMPT: &str = "\
Analyze the sentiment of the following message.
Provide a JSON response with:
- score: a number from -1 (extremely negative) to 1 (extremely positive)
- category: one of \"negative\", \"neutral\", or \"positive\"
- emotions: an object containing detected emotions and their intensity from 0-1

Example response format:
{
  \"score\": -0.7,
  \"category\": \"negative\",
  \"emotions\": {
    \"frustration\": 0.8,
    \"anger\": 0.6,
    \"disappointment\": 0.7
  }
}

Message:
{message}";

pub const SENSITIVE_TOPIC_PROMPT: &str = "\
Analyze the following message and determine if it contains any of these sensitive topics: {topics}.
Provide a JSON response with:
- containsSensitiveTopics: boolean
- detectedTopics: array of strings (empty if none detected)

Example response format:
{
  \"containsSensitiveTopics\": true,
  \"detectedTopics\": [\"billing dispute\", \"refund request\"]
}

Message:
{message}";
