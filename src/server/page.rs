//! The chat surface: a single self-contained HTML page.
//!
//! Rendering is plain placeholder substitution into a static template. The
//! page's script mirrors the [`crate::client`] pipeline: it accumulates SSE
//! chunks into a buffer and re-derives the bullet list from the whole
//! buffer on every chunk, closes any live stream before opening a new one,
//! and keeps partial output visible on interruption or failure.

use crate::core::persona::PersonaRegistry;

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Pundit</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  #transcript { min-height: 12rem; }
  .user { font-weight: 600; margin-top: 1rem; }
  .user.grouped { margin-top: 0.25rem; }
  .assistant ul { margin: 0.25rem 0 0; }
  .error { color: #b00020; margin-top: 0.5rem; }
  #thinking { display: none; color: #666; font-style: italic; }
  #presets button { margin: 0 0.5rem 0.5rem 0; }
  #bar { display: flex; gap: 0.5rem; margin-top: 1rem; }
  #q { flex: 1; padding: 0.4rem; }
</style>
</head>
<body>
<h1>Pundit</h1>
<label>Expert:
  <select id="expert">__OPTIONS__</select>
</label>
<div id="presets">__PRESETS__</div>
<div id="transcript"></div>
<p id="thinking">Thinking&hellip;</p>
<div id="bar">
  <input id="q" placeholder="Ask a question" autofocus>
  <button id="ask">Ask</button>
  <button id="regen">Regenerate</button>
</div>
<script>
(function () {
  var transcript = document.getElementById('transcript');
  var thinking = document.getElementById('thinking');
  var source = null;
  var buffer = '';
  var list = null;
  var lastQuestion = null;
  var lastExpert = null;

  function stripMarker(line) {
    line = line.trim();
    var markers = ['- ', '* ', '• '];
    for (var i = 0; i < markers.length; i++) {
      if (line.indexOf(markers[i]) === 0) return line.slice(markers[i].length).trim();
    }
    if (line === '-' || line === '*' || line === '•') return '';
    return line;
  }

  // Re-derive the whole list from the accumulated buffer on every chunk:
  // bullet markers can arrive split across chunk boundaries.
  function render() {
    list.innerHTML = '';
    buffer.split('\n').forEach(function (line) {
      var item = stripMarker(line);
      if (!item) return;
      var li = document.createElement('li');
      li.textContent = item;
      list.appendChild(li);
    });
  }

  function closeStream() {
    if (source) { source.close(); source = null; }
    thinking.style.display = 'none';
  }

  function appendError(detail) {
    var note = document.createElement('p');
    note.className = 'error';
    note.textContent = detail;
    transcript.appendChild(note);
  }

  function ask(question, expert) {
    question = (question || '').trim();
    if (!question) return;

    closeStream();
    lastQuestion = question;
    lastExpert = expert;

    var user = document.createElement('p');
    user.className = 'user';
    var prev = transcript.lastElementChild;
    if (prev && prev.classList.contains('user')) user.className += ' grouped';
    user.textContent = question;
    transcript.appendChild(user);

    var answer = document.createElement('div');
    answer.className = 'assistant';
    list = document.createElement('ul');
    answer.appendChild(list);
    transcript.appendChild(answer);

    buffer = '';
    thinking.style.display = 'block';

    var url = '/chat-stream?expert=' + encodeURIComponent(expert) +
      '&q=' + encodeURIComponent(question);
    source = new EventSource(url);
    source.onmessage = function (e) {
      thinking.style.display = 'none';
      buffer += e.data;
      render();
    };
    source.addEventListener('error', function (e) {
      // A data-carrying error is the terminal marker from the server;
      // a bare error event is the connection closing after completion.
      if (e.data) appendError(e.data);
      closeStream();
    });
  }

  document.getElementById('ask').onclick = function () {
    var q = document.getElementById('q');
    ask(q.value, document.getElementById('expert').value);
    q.value = '';
  };
  document.getElementById('q').onkeydown = function (e) {
    if (e.key === 'Enter') document.getElementById('ask').onclick();
  };
  document.getElementById('regen').onclick = function () {
    if (lastQuestion) ask(lastQuestion, lastExpert);
  };
  document.querySelectorAll('#presets button').forEach(function (button) {
    button.onclick = function () {
      document.getElementById('expert').value = button.dataset.expert;
      ask(button.dataset.question, button.dataset.expert);
    };
  });
})();
</script>
</body>
</html>
"#;

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn render(registry: &PersonaRegistry) -> String {
    let mut options = String::new();
    let mut presets = String::new();

    for persona in registry.list() {
        let key = persona.key.as_str();
        let selected = if key == "general" { " selected" } else { "" };
        options.push_str(&format!(
            "<option value=\"{key}\"{selected}>{}</option>",
            escape_html(persona.display_name)
        ));
        for preset in persona.presets {
            presets.push_str(&format!(
                "<button data-expert=\"{key}\" data-question=\"{}\">{}</button>",
                escape_html(preset.question),
                escape_html(preset.label)
            ));
        }
    }

    PAGE_TEMPLATE
        .replace("__OPTIONS__", &options)
        .replace("__PRESETS__", &presets)
}
