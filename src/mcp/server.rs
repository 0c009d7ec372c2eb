use crate::mcp::progress::stage_progress;
use rmcp::{
    handler::server::tool::ToolRouter,
    handler::server::wrapper::{Json, Parameters},
    model::*,
    tool, tool_handler, tool_router, Peer, RoleServer, ServerHandler, ServiceExt,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::dxf::FilterConfig;
use crate::error::ForgeError;
use crate::mcp::error::ToolError;
use crate::mcp::turns::TurnStore;
use crate::mcp::{
    DescribeInput, EndTurnResponse, RetrieveInput, RunPipelineInput, StartTurnInput,
    StartTurnResponse, StepResponse, TranscriptEntry, TurnInput, TurnReportResponse,
};
use crate::pipeline::{Agent, PipelineState, PipelineTools, ToolOutput};

/// Open turns kept at once before the oldest are evicted.
const MAX_OPEN_TURNS: u64 = 256;
/// A turn nobody touched for this long is dropped with its scratch files.
const TURN_IDLE: Duration = Duration::from_secs(30 * 60);

/// MCP server exposing the reconstruction pipeline tools.
#[derive(Clone)]
pub struct ForgeServer {
    pub(crate) agent: Arc<Agent>,
    pub(crate) tools: Arc<PipelineTools>,
    pub(crate) turns: TurnStore,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ForgeServer {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            tools: agent.tools().clone(),
            agent,
            turns: TurnStore::new(MAX_OPEN_TURNS, TURN_IDLE),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Open a turn for one user request. Attach an uploaded DWG by object-store key, or a server-side DXF path. Returns the turn_id every other tool needs."
    )]
    #[instrument(name = "mcp.start_turn", skip_all)]
    pub async fn start_turn(
        &self,
        request: Parameters<StartTurnInput>,
    ) -> Result<Json<StartTurnResponse>, ToolError> {
        let Parameters(input) = request;
        self.handle_start_turn(input)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Download the turn's attached DWG and convert it to DXF in the converter container. Failures end the turn."
    )]
    #[instrument(name = "mcp.convert_dwg", skip_all)]
    pub async fn convert_dwg(
        &self,
        request: Parameters<TurnInput>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let Parameters(input) = request;
        self.handle_convert(&input.turn_id)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Summarize the turn's DXF geometry (entity counts, layers, bounding box, per-entity or grouped descriptions). Annotation and construction content is filtered unless include_all is set."
    )]
    #[instrument(name = "mcp.describe_dxf", skip_all)]
    pub async fn describe_dxf(
        &self,
        request: Parameters<DescribeInput>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let Parameters(input) = request;
        self.handle_describe(input)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Retrieve reference (description, script) examples similar to the request and store them as the turn's semantic context. On failure, continue without examples."
    )]
    #[instrument(name = "mcp.retrieve_examples", skip_all)]
    pub async fn retrieve_examples(
        &self,
        request: Parameters<RetrieveInput>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let Parameters(input) = request;
        self.handle_retrieve(&input.turn_id, input.query.as_deref())
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Generate a CadQuery script from the geometry summary and semantic context. After a failed execute_code, this automatically includes the failed script and its error."
    )]
    #[instrument(name = "mcp.generate_code", skip_all)]
    pub async fn generate_code(
        &self,
        request: Parameters<TurnInput>,
        meta: Meta,
        client: Peer<RoleServer>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let progress = stage_progress(&meta, &client, "generate_code");
        progress.stage("generate").await;
        let Parameters(input) = request;
        self.handle_generate(&input.turn_id)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Run the current script in the sandbox and upload the .vtp artifact. At most two runs per turn; a repairable failure allows one generate_code + execute_code repair pass."
    )]
    #[instrument(name = "mcp.execute_code", skip_all)]
    pub async fn execute_code(
        &self,
        request: Parameters<TurnInput>,
        meta: Meta,
        client: Peer<RoleServer>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let progress = stage_progress(&meta, &client, "execute_code");
        progress.stage("execute").await;
        let Parameters(input) = request;
        self.handle_execute(&input.turn_id)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Render six preview PNGs of the turn's artifact from preset camera poses and upload them. Optional; an empty model skips previews."
    )]
    #[instrument(name = "mcp.render_previews", skip_all)]
    pub async fn render_previews(
        &self,
        request: Parameters<TurnInput>,
        meta: Meta,
        client: Peer<RoleServer>,
    ) -> Result<Json<StepResponse>, ToolError> {
        let progress = stage_progress(&meta, &client, "render_previews");
        progress.stage("render").await;
        let Parameters(input) = request;
        self.handle_render(&input.turn_id)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Close the turn, discard its state and return the transcript with the artifact URL, if any."
    )]
    #[instrument(name = "mcp.end_turn", skip_all)]
    pub async fn end_turn(
        &self,
        request: Parameters<TurnInput>,
    ) -> Result<Json<EndTurnResponse>, ToolError> {
        let Parameters(input) = request;
        self.handle_end_turn(&input.turn_id)
            .await
            .map(Json)
            .map_err(ToolError::from)
    }

    #[tool(
        description = "Run a whole turn in fixed order (convert, describe, retrieve, generate, execute with one repair, render) and return the reply."
    )]
    #[instrument(name = "mcp.run_pipeline", skip_all)]
    pub async fn run_pipeline(
        &self,
        request: Parameters<RunPipelineInput>,
        meta: Meta,
        client: Peer<RoleServer>,
    ) -> Result<Json<TurnReportResponse>, ToolError> {
        let progress = stage_progress(&meta, &client, "run_pipeline");
        let Parameters(input) = request;
        let mut state = new_state(input.prompt, input.drawing_key, input.dxf_path)
            .map_err(ToolError::from)?;
        let report = self.agent.run_turn(&mut state, progress.as_ref()).await;
        Ok(Json(report.into()))
    }
}

#[tool_handler]
impl ServerHandler for ForgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "cadforge".to_string(),
                title: Some("CadForge Drawing-to-CAD Pipeline".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                r#"# CadForge

Turns an engineering drawing plus a request into a 3D model.

## One call
- run_pipeline: the whole turn in fixed order

## Step by step
1. start_turn (prompt, optional drawing_key or dxf_path) -> turn_id
2. convert_dwg when a DWG is attached
3. describe_dxf
4. retrieve_examples (failure is not fatal)
5. generate_code
6. execute_code; if it fails with repairable=true, generate_code then execute_code once more
7. render_previews (optional)
8. end_turn

Errors carry error_code and suggestion."#
                    .to_string(),
            ),
        }
    }
}

fn new_state(
    prompt: String,
    drawing_key: Option<String>,
    dxf_path: Option<String>,
) -> Result<PipelineState, ForgeError> {
    if prompt.trim().is_empty() {
        return Err(ForgeError::Validation("prompt must not be empty".into()));
    }
    let mut state = PipelineState::new(prompt)?;
    if let Some(key) = drawing_key.filter(|k| !k.trim().is_empty()) {
        state = state.with_drawing_key(key);
    }
    if let Some(path) = dxf_path.filter(|p| !p.trim().is_empty()) {
        state = state.with_dxf(PathBuf::from(path));
    }
    Ok(state)
}

/// Record a tool result in the turn and shape the response.
fn settle_step(
    state: &mut PipelineState,
    tool: &str,
    result: Result<ToolOutput, ForgeError>,
) -> Result<StepResponse, ForgeError> {
    match result {
        Ok(output) => {
            let message = output.message().to_string();
            state.apply(tool, output);
            Ok(StepResponse::from_state(state, tool, message))
        }
        Err(err) => {
            state.record_error(tool, &err);
            Err(err)
        }
    }
}

impl ForgeServer {
    pub async fn handle_start_turn(
        &self,
        input: StartTurnInput,
    ) -> Result<StartTurnResponse, ForgeError> {
        let state = new_state(input.prompt, input.drawing_key, input.dxf_path)?;
        let mut next_tools = Vec::new();
        if state.input_artifact_key.is_some() {
            next_tools.push("convert_dwg");
        }
        if state.input_artifact_key.is_some() || state.dxf_path.is_some() {
            next_tools.push("describe_dxf");
        }
        next_tools.extend(["retrieve_examples", "generate_code", "execute_code"]);
        if self.tools.renders() {
            next_tools.push("render_previews");
        }
        next_tools.push("end_turn");

        let turn_id = self.turns.open(state).await;
        Ok(StartTurnResponse {
            turn_id: turn_id.to_string(),
            next_tools: next_tools.into_iter().map(String::from).collect(),
        })
    }

    pub async fn handle_convert(&self, turn_id: &str) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(turn_id).await?;
        let mut state = shared.lock().await;
        let result = self.tools.convert_dwg(&mut state).await;
        settle_step(&mut state, "convert_dwg", result)
    }

    pub async fn handle_describe(&self, input: DescribeInput) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(&input.turn_id).await?;
        let mut state = shared.lock().await;
        if let Some(path) = input.dxf_path.filter(|p| !p.trim().is_empty()) {
            state.dxf_path = Some(PathBuf::from(path));
        }
        let filter = (input.include_all || !input.exclude_layers.is_empty()).then(|| {
            FilterConfig {
                include_all: input.include_all,
                exclude_layers: input.exclude_layers,
            }
        });
        let result = self.tools.describe_dxf(&mut state, filter).await;
        settle_step(&mut state, "describe_dxf", result)
    }

    pub async fn handle_retrieve(
        &self,
        turn_id: &str,
        query: Option<&str>,
    ) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(turn_id).await?;
        let mut state = shared.lock().await;
        let result = self.tools.retrieve_examples(&state, query).await;
        settle_step(&mut state, "retrieve_examples", result)
    }

    pub async fn handle_generate(&self, turn_id: &str) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(turn_id).await?;
        let mut state = shared.lock().await;
        let result = self.tools.generate_code(&mut state).await;
        settle_step(&mut state, "generate_code", result)
    }

    pub async fn handle_execute(&self, turn_id: &str) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(turn_id).await?;
        let mut state = shared.lock().await;
        let result = self.tools.execute_code(&mut state).await;
        settle_step(&mut state, "execute_code", result)
    }

    pub async fn handle_render(&self, turn_id: &str) -> Result<StepResponse, ForgeError> {
        let shared = self.turns.get(turn_id).await?;
        let mut state = shared.lock().await;
        let result = self.tools.render_previews(&mut state).await;
        settle_step(&mut state, "render_previews", result)
    }

    pub async fn handle_end_turn(&self, turn_id: &str) -> Result<EndTurnResponse, ForgeError> {
        let shared = self.turns.close(turn_id).await?;
        let state = shared.lock().await;
        Ok(EndTurnResponse {
            turn_id: state.turn_id.to_string(),
            artifact_url: state.artifact.as_ref().map(|a| a.url.clone()),
            executor_calls: state.executor_calls,
            transcript: state.messages.iter().map(TranscriptEntry::from).collect(),
        })
    }
}

/// Run MCP server on stdio transport.
pub async fn run_mcp_server(ctx: crate::init::AppContext) -> anyhow::Result<()> {
    let server = ForgeServer::new(ctx.agent.clone());

    tracing::info!("Starting CadForge MCP server v{}", env!("CARGO_PKG_VERSION"));

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(transport).await?;
    tracing::info!("MCP server listening on stdio (9 tools)");

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    });

    service.waiting().await?;
    tracing::info!("MCP server shutting down");
    Ok(())
}
