//! OpenAI chat-completion client speaking the legacy `functions` protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use leadline_core::config::{AgentConfig, LlmConfig};
use leadline_core::domain::fields::ConversationData;
use leadline_core::domain::message::{ChatMessage, MessageRole};
use leadline_core::errors::AppError;

use crate::llm::{ChatOutcome, FunctionCall, FunctionResult, LlmClient};

const SYSTEM: &str = "OpenAI";
const APOLOGY: &str = "Desculpe, ocorreu um erro ao processar sua solicitação.";

pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    persona: AgentConfig,
}

impl OpenAiChatClient {
    pub fn new(llm: &LlmConfig, persona: &AgentConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .build()
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        Ok(Self {
            http,
            api_key: llm.api_key.clone(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            model: llm.model.clone(),
            persona: persona.clone(),
        })
    }

    fn wire_history(&self, history: &[ChatMessage], data: &ConversationData) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage::system(format!(
            "{}{}",
            system_prompt(&self.persona),
            context_suffix(data)
        )));

        // The provider knows only user/assistant turns; anything else in the
        // stored history is presented as user input.
        for message in history {
            let role = match message.role {
                MessageRole::Assistant => "assistant",
                MessageRole::User | MessageRole::System => "user",
            };
            messages.push(WireMessage::text(role, message.content.clone()));
        }

        messages
    }

    async fn complete(&self, messages: &[WireMessage]) -> Result<ChatOutcome, AppError> {
        let functions = function_declarations();
        let request = CompletionRequest {
            model: &self.model,
            messages,
            functions: &functions,
            function_call: "auto",
            temperature: 0.7,
            max_tokens: 1000,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| AppError::integration(SYSTEM, error.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(AppError::integration(SYSTEM, "Limite de requisições excedido"));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(AppError::integration(SYSTEM, "API Key inválida"));
            }
            status if !status.is_success() => {
                let body = response.json::<Value>().await.unwrap_or(Value::Null);
                let message = body
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                return Err(AppError::integration(SYSTEM, message));
            }
            _ => {}
        }

        let body = response
            .json::<CompletionResponse>()
            .await
            .map_err(|err| AppError::integration(SYSTEM, err.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::integration(SYSTEM, "Resposta vazia da API"))?;

        Ok(outcome_from_choice(choice))
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn chat(
        &self,
        history: &[ChatMessage],
        data: &ConversationData,
    ) -> Result<ChatOutcome, AppError> {
        let messages = self.wire_history(history, data);
        self.complete(&messages).await
    }

    async fn chat_with_function_result(
        &self,
        history: &[ChatMessage],
        function_results: &[FunctionResult],
        data: &ConversationData,
    ) -> Result<ChatOutcome, AppError> {
        let mut messages = self.wire_history(history, data);

        // Only the first result of a batch is threaded back to the model.
        if let Some(first) = function_results.first() {
            let payload = serde_json::to_string(&first.response)
                .map_err(|err| AppError::integration(SYSTEM, err.to_string()))?;
            messages.push(WireMessage::assistant_function_call(&first.name, payload.clone()));
            messages.push(WireMessage::function_result(&first.name, payload));
        }

        self.complete(&messages).await
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    functions: &'a [FunctionDeclaration],
    function_call: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Clone, Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
}

impl WireMessage {
    fn system(content: String) -> Self {
        Self::text("system", content)
    }

    fn text(role: &'static str, content: String) -> Self {
        Self { role, content: Some(content), name: None, function_call: None }
    }

    fn assistant_function_call(name: &str, arguments: String) -> Self {
        Self {
            role: "assistant",
            content: None,
            name: None,
            function_call: Some(WireFunctionCall { name: name.to_string(), arguments }),
        }
    }

    fn function_result(name: &str, content: String) -> Self {
        Self { role: "function", content: Some(content), name: Some(name.to_string()), function_call: None }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

/// Malformed function-call arguments are downgraded to a plain apology: the
/// turn still answers, it just carries no action.
fn outcome_from_choice(choice: Choice) -> ChatOutcome {
    let message = choice.message;
    let text = message.content.unwrap_or_default();

    let Some(call) = message.function_call else {
        return ChatOutcome::text(text);
    };

    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(args) => ChatOutcome {
            message: text,
            function_calls: vec![FunctionCall { name: call.name, args }],
        },
        Err(parse_error) => {
            error!(function = %call.name, error = %parse_error, "argumentos de função ilegíveis");
            ChatOutcome::text(if text.is_empty() { APOLOGY.to_string() } else { text })
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct FunctionDeclaration {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

/// The four actions declared to the model, with enum-typed arguments where
/// the conversation only ever produces a closed set of values.
fn function_declarations() -> Vec<FunctionDeclaration> {
    vec![
        FunctionDeclaration {
            name: "coletar_informacao",
            description:
                "Salva uma informação coletada do lead (nome, email, empresa, telefone, necessidade)",
            parameters: json!({
                "type": "object",
                "properties": {
                    "campo": {
                        "type": "string",
                        "description": "Campo a ser salvo",
                        "enum": ["nome", "email", "empresa", "telefone", "necessidade"],
                    },
                    "valor": {
                        "type": "string",
                        "description": "Valor do campo",
                    },
                },
                "required": ["campo", "valor"],
            }),
        },
        FunctionDeclaration {
            name: "confirmar_interesse",
            description:
                "Marca que o lead confirmou interesse explícito em adquirir o produto/serviço",
            parameters: json!({
                "type": "object",
                "properties": {
                    "confirmado": {
                        "type": "string",
                        "description": "Se o interesse foi confirmado",
                        "enum": ["sim", "nao"],
                    },
                },
                "required": ["confirmado"],
            }),
        },
        FunctionDeclaration {
            name: "buscar_horarios_disponiveis",
            description: "Busca horários disponíveis para agendamento de reunião",
            parameters: json!({
                "type": "object",
                "properties": {
                    "dias_adiante": {
                        "type": "string",
                        "description": "Número de dias para buscar disponibilidade (padrão: 7)",
                    },
                },
                "required": [],
            }),
        },
        FunctionDeclaration {
            name: "agendar_reuniao",
            description: "Agenda uma reunião em um horário específico",
            parameters: json!({
                "type": "object",
                "properties": {
                    "indice_horario": {
                        "type": "string",
                        "description": "Índice do horário escolhido (0, 1, 2, etc)",
                    },
                },
                "required": ["indice_horario"],
            }),
        },
    ]
}

fn system_prompt(persona: &AgentConfig) -> String {
    let AgentConfig { product_name, product_description, company_name, tone, .. } = persona;

    format!(
        "Você é um agente SDR (Sales Development Representative) da {company_name}.

**PRODUTO/SERVIÇO:**
{product_name} - {product_description}

**SUA MISSÃO:**
Conduzir uma conversa natural e consultiva para:
1. Entender o interesse do lead
2. Coletar informações essenciais (nome, email, empresa, necessidade/dor)
3. Identificar se há interesse real em adquirir/contratar
4. Agendar reunião se houver confirmação de interesse

**TOM DA CONVERSA:**
{tone}

**FLUXO DA CONVERSA:**

1. **APRESENTAÇÃO** (primeira mensagem)
   - Se apresente brevemente
   - Explique que pode ajudar com {product_name}
   - Pergunte como pode ajudar

2. **DESCOBERTA** (coleta de informações)
   - Pergunte o NOME da pessoa
   - Pergunte o EMAIL (valide formato)
   - Pergunte a EMPRESA onde trabalha
   - Entenda a NECESSIDADE/DOR do cliente
   - Use a função coletar_informacao() para cada dado

3. **QUALIFICAÇÃO** (confirmar interesse)
   - Após entender a necessidade, faça uma pergunta DIRETA:
     \"Você gostaria de seguir com uma conversa com nosso time para [iniciar o projeto / adquirir o produto]?\"
   - Aguarde confirmação EXPLÍCITA (sim, quero, gostaria, etc)
   - Use confirmar_interesse() quando houver confirmação clara

4. **AGENDAMENTO** (se interesse confirmado)
   - Use buscar_horarios_disponiveis()
   - Apresente 2-3 opções de horários
   - Quando o cliente escolher, use agendar_reuniao(indice)
   - Confirme o agendamento e informe o link

5. **ENCERRAMENTO**
   - Se SEM interesse: agradeça e se coloque à disposição
   - Se COM reunião agendada: confirme detalhes e agradeça

**REGRAS IMPORTANTES:**
- Seja NATURAL e CONVERSACIONAL
- Faça UMA pergunta por vez
- NÃO presuma informações
- NÃO force uma venda
- VALIDE email antes de prosseguir
- SÓ agende se houver confirmação EXPLÍCITA de interesse
- Use as funções para registrar TODOS os dados coletados
- Seja empático e consultivo, não agressivo

**EXEMPLO DE PERGUNTA PARA CONFIRMAR INTERESSE:**
\"Perfeito, {product_name} pode realmente ajudar com isso. Você gostaria de agendar uma conversa de 30 minutos com nosso especialista para discutirmos como podemos atender suas necessidades?\"

Lembre-se: você é um consultor, não um vendedor agressivo. Seu objetivo é ajudar o lead a tomar a melhor decisão."
    )
}

/// Already-collected fields, appended to the system prompt so the model does
/// not ask twice.
fn context_suffix(data: &ConversationData) -> String {
    if data.collected_fields.is_empty() {
        return String::new();
    }

    let mut fields = Vec::new();
    if let Some(name) = &data.name {
        fields.push(format!("Nome: {name}"));
    }
    if let Some(email) = &data.email {
        fields.push(format!("Email: {email}"));
    }
    if let Some(company) = &data.company {
        fields.push(format!("Empresa: {company}"));
    }
    if let Some(need) = &data.need {
        fields.push(format!("Necessidade: {need}"));
    }
    if let Some(interest_confirmed) = data.interest_confirmed {
        fields.push(format!(
            "Interesse confirmado: {}",
            if interest_confirmed { "SIM" } else { "NÃO" }
        ));
    }

    format!("\n\n[DADOS JÁ COLETADOS: {}]", fields.join(", "))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use leadline_core::config::AppConfig;
    use leadline_core::domain::fields::ConversationData;

    use super::{
        context_suffix, function_declarations, outcome_from_choice, system_prompt, Choice,
        ChoiceMessage, WireFunctionCall,
    };

    fn choice(content: Option<&str>, function_call: Option<WireFunctionCall>) -> Choice {
        Choice {
            message: ChoiceMessage { content: content.map(str::to_string), function_call },
        }
    }

    #[test]
    fn four_functions_are_declared_with_closed_enums() {
        let declarations = function_declarations();
        let names = declarations.iter().map(|declaration| declaration.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "coletar_informacao",
                "confirmar_interesse",
                "buscar_horarios_disponiveis",
                "agendar_reuniao"
            ]
        );

        let campo_enum = declarations[0]
            .parameters
            .pointer("/properties/campo/enum")
            .cloned()
            .expect("campo enum");
        assert_eq!(campo_enum, json!(["nome", "email", "empresa", "telefone", "necessidade"]));
    }

    #[test]
    fn plain_text_choice_has_no_function_calls() {
        let outcome = outcome_from_choice(choice(Some("Olá! Como posso ajudar?"), None));
        assert_eq!(outcome.message, "Olá! Como posso ajudar?");
        assert!(outcome.function_calls.is_empty());
    }

    #[test]
    fn function_call_arguments_are_parsed() {
        let outcome = outcome_from_choice(choice(
            None,
            Some(WireFunctionCall {
                name: "coletar_informacao".to_string(),
                arguments: r#"{"campo":"nome","valor":"Igor"}"#.to_string(),
            }),
        ));

        assert_eq!(outcome.function_calls.len(), 1);
        assert_eq!(outcome.function_calls[0].name, "coletar_informacao");
        assert_eq!(outcome.function_calls[0].args["valor"], "Igor");
    }

    #[test]
    fn malformed_arguments_downgrade_to_apology() {
        let outcome = outcome_from_choice(choice(
            None,
            Some(WireFunctionCall {
                name: "coletar_informacao".to_string(),
                arguments: "{campo: nome".to_string(),
            }),
        ));

        assert!(outcome.function_calls.is_empty());
        assert_eq!(outcome.message, super::APOLOGY);
    }

    #[test]
    fn prompt_embeds_the_configured_persona() {
        let persona = AppConfig::default().agent;
        let prompt = system_prompt(&persona);
        assert!(prompt.contains(&persona.company_name));
        assert!(prompt.contains(&persona.product_name));
        assert!(prompt.contains(&persona.tone));
    }

    #[test]
    fn context_suffix_lists_only_collected_fields() {
        let empty = ConversationData::new("s-1");
        assert_eq!(context_suffix(&empty), "");

        let data = ConversationData::from_rows(
            "s-1",
            vec![
                ("name".to_string(), "Igor".to_string()),
                ("interestConfirmed".to_string(), "true".to_string()),
            ],
        );
        let suffix = context_suffix(&data);
        assert!(suffix.starts_with("\n\n[DADOS JÁ COLETADOS: "));
        assert!(suffix.contains("Nome: Igor"));
        assert!(suffix.contains("Interesse confirmado: SIM"));
        assert!(!suffix.contains("Email:"));
    }
}
