//! p5.js page host: compiler, runtime and presentation area backed by
//! an output directory holding `index.html` and `sketch.js`.

use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, trace, warn};

use crate::error::Error;
use crate::runtime::{
  EntryPoint, SketchCompiler, SketchInstance, SketchRuntime, Stage,
  ENTRY_POINT_NAME,
};

pub const PAGE_FILE: &str = "index.html";
pub const SKETCH_FILE: &str = "sketch.js";
pub const PLACEHOLDER_TEXT: &str
  = "Your p5.js sketch will appear here.";

/// p5 instance-mode hooks a sketch body may assign
const LIFECYCLE_HOOKS: &[&str] = &[
  "preload", "setup", "draw", "windowResized",
  "mousePressed", "mouseReleased", "mouseMoved", "mouseDragged",
  "mouseClicked", "mouseWheel", "doubleClicked",
  "keyPressed", "keyReleased", "keyTyped",
  "touchStarted", "touchMoved", "touchEnded",
];

/// At least one of these must be assigned for the sketch to render
const REQUIRED_HOOKS: &[&str] = &["setup", "draw"];

// ===== Compiler =====

/// Structural evaluator for instance-mode p5 bodies.
///
/// Rejects sources with unbalanced brackets or unterminated strings,
/// comments and regex literals, then looks for `p.<hook> = ...`
/// assignments in the remaining code.
#[derive(Debug, Clone, Default)]
pub struct InstanceModeCompiler;

impl SketchCompiler for InstanceModeCompiler
{   fn compile(&self, wrapped_source: &str)
      -> Result<Option<EntryPoint>, Error>
    {   let code = mask_source(wrapped_source)
          .map_err(Error::RuntimeConstruction)?;

        let hooks = assigned_hooks(&code, "p");
        trace!("Detected sketch hooks: {:?}", hooks);
        if !hooks.iter().any(|h| REQUIRED_HOOKS.contains(&h.as_str()))
        {   return Ok(None);
        }

        Ok(Some(EntryPoint
        {   name: ENTRY_POINT_NAME.to_string()
          , source: wrapped_source.to_string()
          , hooks
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Scan
{   Code
  , LineComment
  , BlockComment
  , Quoted(char)
  , Template
  , Regex { in_class: bool }
}

/// Keywords after which `/` starts a regex literal
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
  "return", "typeof", "instanceof", "in", "of", "new", "delete", "void",
  "throw", "case", "do", "else", "yield", "await",
];

/// Whether a `/` following `last` (the previous code character) opens a
/// regex literal rather than dividing
fn starts_regex(last: Option<char>, masked: &str) -> bool
{   match last
    {   None => true
      , Some(c) if is_ident_char(c) => {
          let trimmed = masked.trim_end();
          let before_word = trimmed.trim_end_matches(is_ident_char);
          REGEX_PREFIX_KEYWORDS.contains(&&trimmed[before_word.len()..])
        }
      , Some(c) => !matches!(c, ')' | ']' | '"')
    }
}

/// Blank out strings, comments and regex literals, checking bracket
/// balance. Errors carry a JavaScript-style message.
fn mask_source(source: &str) -> Result<String, String>
{   let chars: Vec<char> = source.chars().collect();
    let mut masked = String::with_capacity(source.len());
    // '$' marks a `${` that returns to template text when closed
    let mut brackets: Vec<(char, usize)> = vec![];
    let mut state = Scan::Code;
    // last code character; '"' stands for any string, template or regex
    let mut last: Option<char> = None;
    let mut line = 1;
    let mut i = 0;

    while i < chars.len()
    {   let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '\n'
        {   line += 1;
        }

        match state
        {   Scan::Code => match c
            {   '/' if next == Some('/') => {
                  state = Scan::LineComment;
                  masked.push_str("  ");
                  i += 2;
                  continue;
                }
              , '/' if next == Some('*') => {
                  state = Scan::BlockComment;
                  masked.push_str("  ");
                  i += 2;
                  continue;
                }
              , '/' if starts_regex(last, &masked) => {
                  state = Scan::Regex { in_class: false };
                  masked.push(' ');
                }
              , '\'' | '"' => {
                  state = Scan::Quoted(c);
                  masked.push(' ');
                }
              , '`' => {
                  state = Scan::Template;
                  masked.push(' ');
                }
              , '(' | '[' | '{' => {
                  brackets.push((c, line));
                  masked.push(c);
                  last = Some(c);
                }
              , ')' | ']' | '}' => {
                  match brackets.pop()
                  {   Some(('$', _)) if c == '}' => {
                        state = Scan::Template;
                        masked.push(' ');
                      }
                    , Some((open, _)) if closes(open, c) => {
                        masked.push(c);
                        last = Some(c);
                      }
                    , _ => {
                        return Err(format!(
                          "SyntaxError: Unexpected token '{}' (line {})",
                          c, line
                        ));
                      }
                  }
                }
              , _ => {
                  masked.push(c);
                  if !c.is_whitespace()
                  {   last = Some(c);
                  }
                }
            }
          , Scan::LineComment => {
              if c == '\n'
              {   state = Scan::Code;
                  masked.push('\n');
              } else
              {   masked.push(' ');
              }
            }
          , Scan::BlockComment => {
              if c == '*' && next == Some('/')
              {   state = Scan::Code;
                  masked.push_str("  ");
                  i += 2;
                  continue;
              }
              masked.push(if c == '\n' { '\n' } else { ' ' });
            }
          , Scan::Quoted(quote) => {
              if c == '\\'
              {   skip_escape(next, &mut masked, &mut line);
                  i += 2;
                  continue;
              }
              if c == '\n'
              {   return Err(format!(
                    "SyntaxError: Invalid or unexpected token (line {})",
                    line - 1
                  ));
              }
              if c == quote
              {   state = Scan::Code;
                  last = Some('"');
              }
              masked.push(' ');
            }
          , Scan::Template => {
              if c == '\\'
              {   skip_escape(next, &mut masked, &mut line);
                  i += 2;
                  continue;
              }
              if c == '$' && next == Some('{')
              {   brackets.push(('$', line));
                  state = Scan::Code;
                  last = Some('{');
                  masked.push_str("  ");
                  i += 2;
                  continue;
              }
              if c == '`'
              {   state = Scan::Code;
                  last = Some('"');
              }
              masked.push(if c == '\n' { '\n' } else { ' ' });
            }
          , Scan::Regex { in_class } => {
              if c == '\\' && next != Some('\n')
              {   masked.push_str("  ");
                  i += 2;
                  continue;
              }
              if c == '\n'
              {   return Err(format!(
                    "SyntaxError: Invalid regular expression: missing / (line {})",
                    line - 1
                  ));
              }
              match c
              {   '[' => state = Scan::Regex { in_class: true }
                , ']' => state = Scan::Regex { in_class: false }
                , '/' if !in_class => {
                    state = Scan::Code;
                    last = Some('"');
                  }
                , _ => {}
              }
              masked.push(' ');
            }
        }
        i += 1;
    }

    match state
    {   Scan::Code | Scan::LineComment => {}
      , Scan::BlockComment => {
          return Err("SyntaxError: Unterminated comment".to_string());
        }
      , Scan::Quoted(_) | Scan::Template => {
          return Err("SyntaxError: Unterminated string".to_string());
        }
      , Scan::Regex { .. } => {
          return Err(
            "SyntaxError: Invalid regular expression: missing /".to_string()
          );
        }
    }
    if let Some((open, opened_at)) = brackets.pop()
    {   return Err(format!(
          "SyntaxError: Unexpected end of input ('{}' opened on line {} is never closed)",
          if open == '$' { '{' } else { open },
          opened_at
        ));
    }
    Ok(masked)
}

/// Mask a backslash escape; a line continuation still counts its line
fn skip_escape(escaped: Option<char>, masked: &mut String, line: &mut usize)
{   if escaped == Some('\n')
    {   *line += 1;
        masked.push_str(" \n");
    } else
    {   masked.push_str("  ");
    }
}

fn closes(open: char, close: char) -> bool
{   matches!((open, close), ('(', ')') | ('[', ']') | ('{', '}'))
}

fn is_ident_char(c: char) -> bool
{   c.is_alphanumeric() || c == '_' || c == '$'
}

/// Hooks assigned as `<param>.<hook> = ...`, in first-seen order
fn assigned_hooks(code: &str, param: &str) -> Vec<String>
{   let chars: Vec<char> = code.chars().collect();
    let param: Vec<char> = param.chars().collect();
    let mut hooks: Vec<String> = vec![];

    let skip_ws = |mut j: usize| {
      while j < chars.len() && chars[j].is_whitespace()
      {   j += 1;
      }
      j
    };

    for start in 0..chars.len()
    {   if !chars[start..].starts_with(&param)
        {   continue;
        }
        if start > 0
          && (is_ident_char(chars[start - 1]) || chars[start - 1] == '.')
        {   continue;
        }

        let mut j = skip_ws(start + param.len());
        if chars.get(j) != Some(&'.')
        {   continue;
        }
        j = skip_ws(j + 1);
        let name_start = j;
        while j < chars.len() && is_ident_char(chars[j])
        {   j += 1;
        }
        let name: String = chars[name_start..j].iter().collect();
        j = skip_ws(j);
        let assigns = chars.get(j) == Some(&'=')
          && chars.get(j + 1) != Some(&'=');

        if assigns
          && LIFECYCLE_HOOKS.contains(&name.as_str())
          && !hooks.contains(&name)
        {   hooks.push(name);
        }
    }
    hooks
}

// ===== Presentation area =====

/// `index.html` in the output directory; the mount element shows a
/// placeholder until a sketch is constructed
pub struct PageStage
{   dir: PathBuf
  , mount_id: String
  , p5_url: String
}

impl PageStage
{   pub fn new(config: &crate::config::StageConfig) -> Self
    {   PageStage
        {   dir: config.output_dir.clone()
          , mount_id: config.mount_id.clone()
          , p5_url: config.p5_url.clone()
        }
    }

    pub fn page_path(&self) -> PathBuf
    {   self.dir.join(PAGE_FILE)
    }

    fn render(&self, with_sketch: bool) -> String
    {   let (body, scripts) = if with_sketch
        {   ( String::new()
            , format!(
                "  <script src=\"{}\"></script>\n  <script src=\"{}\"></script>\n",
                self.p5_url, SKETCH_FILE
              )
            )
        } else
        {   ( format!("<p class=\"placeholder\">{}</p>", PLACEHOLDER_TEXT)
            , String::new()
            )
        };
        format!(
          "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <title>sketchgen</title>\n</head>\n<body>\n  <div id=\"{}\">{}</div>\n{}</body>\n</html>\n",
          self.mount_id, body, scripts
        )
    }

    fn write(&self, with_sketch: bool) -> Result<(), Error>
    {   fs::create_dir_all(&self.dir)?;
        fs::write(self.page_path(), self.render(with_sketch))?;
        Ok(())
    }
}

impl Stage for PageStage
{   fn reset(&mut self) -> Result<(), Error>
    {   debug!("Resetting {}", self.page_path().display());
        self.write(false)
    }

    fn clear(&mut self) -> Result<(), Error>
    {   self.write(true)
    }
}

// ===== Runtime =====

/// Writes `sketch.js`, which hands the entry point to `new p5(...)`
pub struct P5PageRuntime
{   dir: PathBuf
}

impl P5PageRuntime
{   pub fn new(dir: impl Into<PathBuf>) -> Self
    {   P5PageRuntime { dir: dir.into() }
    }
}

impl SketchRuntime for P5PageRuntime
{   fn construct(
      &mut self
    , entry: &EntryPoint
    , mount_id: &str
    ) -> Result<Box<dyn SketchInstance>, Error>
    {   let mount = serde_json::to_string(mount_id)
          .map_err(|e| Error::Other(e.to_string()))?;
        let script = format!(
          "{}\nnew p5({}, {});\n",
          entry.source, entry.name, mount
        );
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(SKETCH_FILE);
        fs::write(&path, script)?;
        debug!("Wrote {} ({} hooks)", path.display(), entry.hooks.len());
        Ok(Box::new(PageSketch { path }))
    }
}

/// A sketch living in `sketch.js`; removal deletes the script
pub struct PageSketch
{   path: PathBuf
}

impl PageSketch
{   pub fn path(&self) -> &Path
    {   &self.path
    }
}

impl SketchInstance for PageSketch
{   fn remove(&mut self)
    {   match fs::remove_file(&self.path)
        {   Ok(()) => debug!("Removed {}", self.path.display())
          , Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
          , Err(e) => warn!(
              "Failed to remove {}: {}", self.path.display(), e
            )
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::runtime::wrap_sketch_source;

    fn compile(body: &str) -> Result<Option<EntryPoint>, Error>
    {   InstanceModeCompiler.compile(&wrap_sketch_source(body))
    }

    #[test]
    fn accepts_setup_and_draw()
    {   let entry = compile(
          "p.setup = function() {\n  p.createCanvas(400, 400);\n};\n\
           p.draw = function() {\n  p.background(220);\n  p.ellipse(p.width / 2, 200, 80, 80);\n};"
        ).unwrap().unwrap();
        assert_eq!(entry.name, "sketch");
        assert_eq!(entry.hooks, vec!["setup", "draw"]);
    }

    #[test]
    fn arrow_functions_and_extra_hooks_count()
    {   let entry = compile(
          "let angle = 0;\np.draw = () => { angle += 0.01; };\np.mousePressed = () => p.noLoop();"
        ).unwrap().unwrap();
        assert_eq!(entry.hooks, vec!["draw", "mousePressed"]);
    }

    #[test]
    fn body_without_hooks_has_no_entry_point()
    {   assert_eq!(compile("let x = 1;\nconsole.log(x);").unwrap(), None);
        // comparison, not assignment
        assert_eq!(compile("if (p.draw == null) {}").unwrap(), None);
        // only mentioned inside strings and comments
        assert_eq!(
          compile("// p.setup = f\nconst s = 'p.draw = g';").unwrap(),
          None
        );
    }

    #[test]
    fn other_objects_are_not_the_instance()
    {   assert_eq!(compile("app.draw = () => {};").unwrap(), None);
        assert_eq!(compile("q.p.setup = () => {};").unwrap(), None);
    }

    #[test]
    fn unbalanced_source_is_an_evaluation_error()
    {   let err = compile("p.setup = function() {").unwrap_err();
        assert!(matches!(err, Error::RuntimeConstruction(ref m)
          if m.contains("Unexpected end of input")));

        let err = compile("p.draw = () => { p.fill(0)) };").unwrap_err();
        assert!(matches!(err, Error::RuntimeConstruction(ref m)
          if m.contains("Unexpected token ')'")));
    }

    #[test]
    fn unterminated_strings_and_comments_fail()
    {   assert!(compile("p.draw = () => {};\nlet s = 'oops;").is_err());
        assert!(compile("p.draw = () => {};\n/* never closed").is_err());
    }

    #[test]
    fn brackets_inside_strings_and_templates_are_ignored()
    {   let entry = compile(
          "p.draw = () => {\n  p.text(`score: ${p.frameCount} }`, 10, 10);\n  p.text(\"(\", 0, 0);\n};"
        ).unwrap();
        assert!(entry.is_some());
    }

    #[test]
    fn regex_literals_are_not_code()
    {   let entry = compile(
          "const open = /[(]/;\nconst quote = /\"/g;\n\
           p.draw = () => {\n  if (open.test(s) && quote.test(s)) { return /\\//.source; }\n};"
        ).unwrap();
        assert!(entry.is_some());
        // division is still division
        let entry = compile(
          "p.draw = () => { p.circle(p.width / 2, p.height / 2, 10); };"
        ).unwrap();
        assert!(entry.is_some());
        assert!(compile("p.draw = () => {};\nconst r = /abc;").is_err());
    }

    #[test]
    fn line_continuation_in_string_counts_its_line()
    {   let err = compile(
          "p.draw = () => {};\nconst s = 'a\\\nb';\n)"
        ).unwrap_err();
        // the stray bracket sits on body line 4, template line 5
        assert!(matches!(err, Error::RuntimeConstruction(ref m)
          if m.contains("Unexpected token ')' (line 5)")));
    }

    #[test]
    fn page_runtime_writes_and_removes_sketch()
    {   let dir = tempfile::tempdir().unwrap();
        let entry = compile("p.draw = () => {};").unwrap().unwrap();
        let mut runtime = P5PageRuntime::new(dir.path());

        let mut instance = runtime
          .construct(&entry, "canvas-container")
          .unwrap();
        let script = fs::read_to_string(dir.path().join(SKETCH_FILE))
          .unwrap();
        assert!(script.starts_with("const sketch = function(p) {"));
        assert!(script.ends_with("new p5(sketch, \"canvas-container\");\n"));

        instance.remove();
        assert!(!dir.path().join(SKETCH_FILE).exists());
        // second removal is harmless
        instance.remove();
    }

    #[test]
    fn stage_toggles_placeholder()
    {   let dir = tempfile::tempdir().unwrap();
        let config = crate::config::StageConfig
        {   output_dir: dir.path().join("out")
          , ..Default::default()
        };
        let mut stage = PageStage::new(&config);

        stage.reset().unwrap();
        let page = fs::read_to_string(stage.page_path()).unwrap();
        assert!(page.contains(PLACEHOLDER_TEXT));
        assert!(!page.contains(SKETCH_FILE));

        stage.clear().unwrap();
        let page = fs::read_to_string(stage.page_path()).unwrap();
        assert!(!page.contains(PLACEHOLDER_TEXT));
        assert!(page.contains("<div id=\"canvas-container\"></div>"));
        assert!(page.contains(SKETCH_FILE));
    }

    #[test]
    fn released_sketch_stays_on_the_page()
    {   let dir = tempfile::tempdir().unwrap();
        let config = crate::config::StageConfig
        {   output_dir: dir.path().to_path_buf()
          , ..Default::default()
        };
        let mut manager = crate::page_runtime_manager(&config);
        assert!(manager.run("p.draw = () => {};").is_started());

        assert!(manager.release());
        drop(manager);

        let page = fs::read_to_string(dir.path().join(PAGE_FILE)).unwrap();
        assert!(page.contains(SKETCH_FILE));
        assert!(dir.path().join(SKETCH_FILE).exists());
    }

    #[test]
    fn cleanup_leaves_a_consistent_page()
    {   let dir = tempfile::tempdir().unwrap();
        let config = crate::config::StageConfig
        {   output_dir: dir.path().to_path_buf()
          , ..Default::default()
        };
        let mut manager = crate::page_runtime_manager(&config);
        assert!(manager.run("p.draw = () => {};").is_started());

        assert!(manager.cleanup());

        let page = fs::read_to_string(dir.path().join(PAGE_FILE)).unwrap();
        assert!(page.contains(PLACEHOLDER_TEXT));
        assert!(!page.contains(SKETCH_FILE));
        assert!(!dir.path().join(SKETCH_FILE).exists());
    }
}
