//! Interactive session loop, the terminal front end of the workflow.
//!
//! Each line read from stdin is one UI trigger (feedback, approve, risks,
//! save, ...). Only the affordances the last stage output made visible are
//! offered in the prompt.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use riskflow_core::{
    OutputKind, Panels, PipelineController, StageOutcome, StageOutput, save_confirmation,
    save_output,
};
use riskflow_shared::{Document, Session};

use crate::commands::{CancelOnCtrlC, CliProgress, print_output};

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplCommand {
    /// Re-evaluate the current features with this feedback.
    Feedback(String),
    /// Approve the current features, or the given edited list.
    Approve(Option<String>),
    Risks,
    /// Save an output; defaults to the one shown last.
    Save(Option<OutputKind>),
    /// Start over with another document.
    Upload(PathBuf),
    Show,
    Help,
    Quit,
    Empty,
}

/// Parse a line of input into a command.
pub(crate) fn parse_command(line: &str) -> std::result::Result<ReplCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let arg = (!rest.is_empty()).then(|| rest.to_string());

    match word.to_ascii_lowercase().as_str() {
        "" => Ok(ReplCommand::Empty),
        "feedback" | "f" => Ok(ReplCommand::Feedback(rest.to_string())),
        "approve" | "a" => Ok(ReplCommand::Approve(arg)),
        "risks" | "r" => Ok(ReplCommand::Risks),
        "save" | "s" => match arg {
            None => Ok(ReplCommand::Save(None)),
            Some(kind) => kind
                .parse::<OutputKind>()
                .map(|k| ReplCommand::Save(Some(k)))
                .map_err(|e| e.to_string()),
        },
        "upload" | "u" => arg
            .map(|path| ReplCommand::Upload(PathBuf::from(path)))
            .ok_or_else(|| "usage: upload <document>".to_string()),
        "show" => Ok(ReplCommand::Show),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "q" | "exit" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown command '{other}' (type 'help')")),
    }
}

// ---------------------------------------------------------------------------
// Session view
// ---------------------------------------------------------------------------

/// What the user currently sees: the session plus its visible outputs.
pub(crate) struct SessionView {
    session: Session,
    /// Feature text as last shown, the input to feedback and approval.
    current_features: String,
    risks: Option<String>,
    active: OutputKind,
    panels: Panels,
}

impl SessionView {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            current_features: String::new(),
            risks: None,
            active: OutputKind::Features,
            panels: Panels::default(),
        }
    }

    /// Show a stage output and track what is now visible.
    ///
    /// Only successful results replace the visible text; error messages
    /// are printed but never become the input to a later stage.
    fn apply(&mut self, output: &StageOutput) {
        print_output(output);
        self.panels = output.panels;

        if matches!(
            output.outcome,
            StageOutcome::Completed | StageOutcome::Degraded
        ) {
            self.active = output.kind;
            match output.kind {
                OutputKind::Features => self.current_features = output.text.clone(),
                OutputKind::Risks => self.risks = Some(output.text.clone()),
                OutputKind::Summary => {}
            }
        }
    }

    /// Text currently shown for an output, if any.
    fn visible_text(&self, kind: OutputKind) -> Option<String> {
        match kind {
            OutputKind::Summary => self
                .session
                .state
                .project_summary()
                .map(|s| s.as_str().to_string()),
            OutputKind::Features => {
                (!self.current_features.is_empty()).then(|| self.current_features.clone())
            }
            OutputKind::Risks => self.risks.clone(),
        }
    }

    fn reset_visible(&mut self) {
        self.current_features.clear();
        self.risks = None;
        self.active = OutputKind::Features;
    }

    async fn upload(&mut self, controller: &PipelineController, document: &Document) {
        self.reset_visible();
        let cancel = CancelOnCtrlC::new();
        let output = controller
            .start_pipeline(&mut self.session, document, &CliProgress::new(), cancel.token())
            .await;
        self.apply(&output);
    }

    /// Execute one command. Returns `false` when the session should end.
    async fn dispatch(
        &mut self,
        controller: &PipelineController,
        command: ReplCommand,
        out_dir: &Path,
    ) -> Result<bool> {
        debug!(?command, stage = %self.session.stage, "dispatching command");

        match command {
            ReplCommand::Empty => {}
            ReplCommand::Feedback(feedback) => {
                let cancel = CancelOnCtrlC::new();
                let output = controller
                    .submit_feedback(
                        &mut self.session,
                        &feedback,
                        &self.current_features,
                        &CliProgress::new(),
                        cancel.token(),
                    )
                    .await;
                self.apply(&output);
            }
            ReplCommand::Approve(edited) => {
                let features = edited.unwrap_or_else(|| self.current_features.clone());
                let output = controller.approve_features(&mut self.session, &features);
                self.apply(&output);
            }
            ReplCommand::Risks => {
                let cancel = CancelOnCtrlC::new();
                let output = controller
                    .analyze_risks(&mut self.session, &CliProgress::new(), cancel.token())
                    .await;
                self.apply(&output);
            }
            ReplCommand::Save(kind) => {
                let kind = kind.unwrap_or(self.active);
                match self.visible_text(kind) {
                    Some(text) => {
                        let path = save_output(out_dir, kind, &text)?;
                        println!("  {} ({})", save_confirmation(kind), path.display());
                    }
                    None => println!("  Nothing to save for {} yet.", kind.label()),
                }
            }
            ReplCommand::Upload(path) => match Document::from_path(&path) {
                Ok(document) => self.upload(controller, &document).await,
                Err(e) => println!("  {}", e.user_message()),
            },
            ReplCommand::Show => self.print_state(),
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => return Ok(false),
        }

        Ok(true)
    }

    fn print_state(&self) {
        let state = &self.session.state;
        println!();
        println!("  Session:  {}", self.session.id);
        println!("  Stage:    {}", self.session.stage);
        if let Some(summary) = state.project_summary() {
            println!("  Summary:  {summary}");
        }
        if let Some(features) = state.feature_details() {
            println!("  Features: {features}");
        }
        match (state.approved_features(), state.approved_at()) {
            (Some(approved), Some(at)) => {
                println!("  Approved: {approved} (at {})", at.format("%H:%M:%S"));
            }
            (Some(approved), None) => println!("  Approved: {approved}"),
            _ => println!("  Approved: -"),
        }
        println!();
    }
}

fn print_help() {
    println!();
    println!("  feedback <text>    re-evaluate the features with your feedback");
    println!("  approve [features] approve the current (or an edited) feature list");
    println!("  risks              analyze risks for the approved features");
    println!("  save [summary|features|risks]");
    println!("                     save an output (defaults to the last one shown)");
    println!("  upload <document>  start over with another document");
    println!("  show               show the session state");
    println!("  quit               end the session");
    println!();
}

fn prompt_for(panels: Panels) -> String {
    let mut actions = Vec::new();
    if panels.feedback {
        actions.push("feedback");
        actions.push("approve");
    }
    if panels.risks {
        actions.push("risks");
    }
    actions.extend(["save", "upload", "help", "quit"]);
    format!("[{}]> ", actions.join("|"))
}

/// Forward lines from `reader` over a channel from a detached thread.
///
/// A blocking read cannot be cancelled, so it must not live on the
/// runtime's blocking pool: the runtime would wait for it on shutdown.
fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive a session from stdin until the user quits or input ends.
pub(crate) async fn run_session(
    controller: &PipelineController,
    document: Document,
    out_dir: &Path,
) -> Result<()> {
    let mut view = SessionView::new(controller.new_session());
    info!(session = %view.session.id, "session created");

    view.upload(controller, &document).await;

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    loop {
        print!("{}", prompt_for(view.panels));
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.recv() => line.transpose()?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_command(&line) {
            Ok(command) => {
                if !view.dispatch(controller, command, out_dir).await? {
                    break;
                }
            }
            Err(message) => println!("  {message}"),
        }
    }

    info!(
        session = %view.session.id,
        stage = %view.session.stage,
        "session ended"
    );
    Ok(())
}
