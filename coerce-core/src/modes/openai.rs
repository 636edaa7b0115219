//! OpenAI-protocol handlers (also used by Mistral)

use super::messages::{inject_instruction, json_instruction, merge_consecutive_messages};
use super::Target;
use crate::error::CoerceError;
use crate::modes::Mode;
use crate::protocol::{
    ChatRequest, FunctionChoice, JsonSchemaFormat, Message, ResponseFormat, ToolChoice,
};

pub(crate) const MD_JSON_REQUEST: &str =
    "Return the correct JSON response within a ```json codeblock. not the JSON_SCHEMA";

pub(super) fn functions(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::Functions)?;
    request.functions = Some(vec![doc.openai_function()]);
    request.function_call = Some(FunctionChoice {
        name: doc.name.clone(),
    });
    Ok(request)
}

pub(super) fn tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::Tools)?;
    request.tools = Some(vec![doc.openai_tool()]);
    request.tool_choice = Some(ToolChoice::function(doc.name.clone()));
    Ok(request)
}

pub(super) fn mistral_tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::MistralTools)?;
    request.tools = Some(vec![doc.openai_tool()]);
    request.tool_choice = Some(ToolChoice::Mode("any".to_string()));
    Ok(request)
}

pub(super) fn parallel_tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    if request.is_streaming() {
        return Err(CoerceError::precondition(
            "stream=true is not supported when using PARALLEL_TOOLS mode",
        ));
    }
    request.tools = Some(target.docs().iter().map(|doc| doc.openai_tool()).collect());
    request.tool_choice = Some(ToolChoice::Mode("auto".to_string()));
    Ok(request)
}

pub(super) fn json(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::Json)?;
    request.response_format = Some(ResponseFormat::JsonObject);
    inject_instruction(&mut request.messages, &json_instruction(doc));
    Ok(request)
}

pub(super) fn json_schema(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::JsonSchema)?;
    request.response_format = Some(ResponseFormat::JsonSchema {
        json_schema: JsonSchemaFormat {
            name: doc.name.clone(),
            schema: doc.schema.clone(),
            strict: None,
        },
    });
    inject_instruction(&mut request.messages, &json_instruction(doc));
    Ok(request)
}

pub(super) fn md_json(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::MdJson)?;
    request.messages.push(Message::user(MD_JSON_REQUEST));
    request.messages = merge_consecutive_messages(std::mem::take(&mut request.messages));
    inject_instruction(&mut request.messages, &json_instruction(doc));
    Ok(request)
}
