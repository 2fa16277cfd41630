//! Progress text for server-side function calls
//!
//! Maps an opaque function identifier and a lifecycle phase to the line shown
//! under a streaming reply. Total over all identifiers: unknown names get the
//! generic text for the phase.

/// Lifecycle phase of a function call within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// `function_start` received
    Started,
    /// `function_result` received
    Completed,
    /// Reply text is streaming after a function ran
    Synthesizing,
}

pub const GENERIC_STARTED: &str = "Processing…";
pub const GENERIC_COMPLETED: &str = "Data received, preparing response…";
pub const GENERIC_SYNTHESIZING: &str = "Generating response…";

struct PhaseTexts {
    started: &'static str,
    completed: &'static str,
    synthesizing: &'static str,
}

impl PhaseTexts {
    const fn new(started: &'static str, completed: &'static str, synthesizing: &'static str) -> Self {
        Self {
            started,
            completed,
            synthesizing,
        }
    }

    fn get(&self, phase: Phase) -> &'static str {
        match phase {
            Phase::Started => self.started,
            Phase::Completed => self.completed,
            Phase::Synthesizing => self.synthesizing,
        }
    }
}

const GENERIC: PhaseTexts = PhaseTexts::new(GENERIC_STARTED, GENERIC_COMPLETED, GENERIC_SYNTHESIZING);

/// Identifiers with dedicated progress text
pub const KNOWN_FUNCTIONS: &[&str] = &[
    "get_calendar_events",
    "create_calendar_event",
    "get_tasks",
    "create_task",
    "complete_task",
    "delete_task",
    "get_current_weather",
    "get_weather_forecast",
    "get_news_headlines",
    "search_news",
    "web_search",
    "get_daily_briefing",
    "get_gmail_messages",
    "search_emails",
    "send_email",
    "remember_info",
    "search_memory",
    "add_knowledge",
    "check_server_status",
    "get_system_metrics",
    "who_am_i",
    "get_ai_configuration",
    "get_current_datetime",
];

fn texts_for(function_name: &str) -> Option<PhaseTexts> {
    let texts = match function_name {
        "get_calendar_events" => PhaseTexts::new(
            "Checking your calendar…",
            "Calendar loaded, reviewing your events…",
            "Summarizing your schedule…",
        ),
        "create_calendar_event" => PhaseTexts::new(
            "Creating the calendar event…",
            "Event created, confirming details…",
            "Confirming your new event…",
        ),
        "get_tasks" => PhaseTexts::new(
            "Fetching your tasks…",
            "Tasks loaded, reviewing them…",
            "Summarizing your tasks…",
        ),
        "create_task" => PhaseTexts::new(
            "Creating the task…",
            "Task created, confirming details…",
            "Confirming your new task…",
        ),
        "complete_task" => PhaseTexts::new(
            "Marking the task as done…",
            "Task completed, updating your list…",
            "Confirming the completed task…",
        ),
        "delete_task" => PhaseTexts::new(
            "Deleting the task…",
            "Task deleted, updating your list…",
            "Confirming the deletion…",
        ),
        "get_current_weather" => PhaseTexts::new(
            "Checking the current weather…",
            "Weather data received…",
            "Describing the weather…",
        ),
        "get_weather_forecast" => PhaseTexts::new(
            "Fetching the weather forecast…",
            "Forecast received…",
            "Summarizing the forecast…",
        ),
        "get_news_headlines" => PhaseTexts::new(
            "Fetching the latest headlines…",
            "Headlines received…",
            "Summarizing the news…",
        ),
        "search_news" => PhaseTexts::new(
            "Searching the news…",
            "News results received…",
            "Summarizing the articles…",
        ),
        "web_search" => PhaseTexts::new(
            "Searching the web…",
            "Search results received…",
            "Summarizing what I found…",
        ),
        "get_daily_briefing" => PhaseTexts::new(
            "Preparing your daily briefing…",
            "Briefing data collected…",
            "Writing your briefing…",
        ),
        "get_gmail_messages" => PhaseTexts::new(
            "Checking your inbox…",
            "Emails loaded, reviewing them…",
            "Summarizing your emails…",
        ),
        "search_emails" => PhaseTexts::new(
            "Searching your email…",
            "Matching emails found…",
            "Summarizing the matches…",
        ),
        "send_email" => PhaseTexts::new(
            "Sending the email…",
            "Email sent…",
            "Confirming the sent email…",
        ),
        "remember_info" => PhaseTexts::new(
            "Saving that to memory…",
            "Saved to memory…",
            "Confirming what I saved…",
        ),
        "search_memory" => PhaseTexts::new(
            "Searching my memory…",
            "Memories found…",
            "Recalling the details…",
        ),
        "add_knowledge" => PhaseTexts::new(
            "Adding to the knowledge base…",
            "Knowledge entry stored…",
            "Confirming the new entry…",
        ),
        "check_server_status" | "get_system_metrics" => PhaseTexts::new(
            "Checking server health…",
            "Server metrics received…",
            "Summarizing server status…",
        ),
        "who_am_i" | "get_ai_configuration" => PhaseTexts::new(
            "Checking my configuration…",
            "Configuration loaded…",
            "Describing my setup…",
        ),
        "get_current_datetime" => PhaseTexts::new(
            "Checking the time…",
            "Time received…",
            "Working out the date…",
        ),
        _ => return None,
    };
    Some(texts)
}

/// Progress text for `function_name` in `phase`.
pub fn resolve(function_name: &str, phase: Phase) -> &'static str {
    texts_for(function_name).unwrap_or(GENERIC).get(phase)
}

pub fn is_known(function_name: &str) -> bool {
    texts_for(function_name).is_some()
}
