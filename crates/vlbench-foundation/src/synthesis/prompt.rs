//! Synthesis prompt assembly

use super::extract::MARKER;
use crate::dispatcher::DISPATCH_HARNESS_SOURCE;
use vlbench_kernel::{ADAPTER_NAME_SUFFIX, GENERATOR_CONTRACT_SOURCE, ModelIdentifier};

/// Known-good adapter shown to the code generator
pub const REFERENCE_ADAPTER_SOURCE: &str = include_str!("../../assets/openai_adapter.rhai");

/// Functions a generated script can call
pub const SCRIPT_HOST_API: &str = "\
- http_post_json(url, headers, body) -> map: POST `body` as JSON with the string map `headers`, returns the decoded JSON reply
- read_image_base64(path) -> string: the image file, base64-encoded
- image_mime_type(path) -> string: MIME type detected from the image bytes
- env_var(name) -> string or (): environment variable, `()` when unset
- to_json(value) -> string: serialize a map, array or scalar as JSON text
- from_json(text) -> value: parse JSON text, `()` when it is not valid JSON
- log(message), warn(message), error(message): write to the run log";

/// Full prompt for one identifier
pub fn build_prompt(identifier: &ModelIdentifier, model_card: &str) -> String {
    format!(
        "You are writing an adapter so that the vision-language model `{identifier}` can be \
evaluated by a benchmark harness. The harness runs adapters as Rhai scripts.

The adapter must follow the generator contract below. Each adapter answers one question about \
one image and returns the answer text.

## Generator contract (Rust)

```rust
{contract}
```

## Dispatch harness (Rust)

This is how adapters are resolved, approved, loaded and called.

```rust
{harness}
```

## Script host API

{host_api}

## Reference adapter (Rhai)

```rhai
{reference}
```

## Model card for `{identifier}`

{model_card}

## Task

Write a Rhai script for `{identifier}` in the style of the reference adapter:
- declare exactly one constructor `fn <Name>{suffix}(ctx)` that returns the adapter state as a map
- declare `fn generate_response(question, image_path)` that reads the state from `this` and returns the answer string
- `ctx` holds `identifier`, `model_path`, `device`, `torch_dtype` and `generation` \
(`max_length`, `temperature`, `do_sample`, `no_repeat_ngram_size`, `eos_token_id_list`)
- do not run anything at the top level of the script

Output the line `{marker}` on its own line first, followed only by the script. \
Do not add explanations.
",
        identifier = identifier,
        contract = GENERATOR_CONTRACT_SOURCE.trim_end(),
        harness = DISPATCH_HARNESS_SOURCE.trim_end(),
        host_api = SCRIPT_HOST_API,
        reference = REFERENCE_ADAPTER_SOURCE.trim_end(),
        model_card = model_card.trim(),
        suffix = ADAPTER_NAME_SUFFIX,
        marker = MARKER,
    )
}
