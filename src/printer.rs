//! Typed vendor commands, one queued command per call.

use crate::commands::{Alignment, CommandTicket, PrinterOperation, QrErrorLevel};
use crate::manager::ConnectionManager;
use tracing::debug;

impl ConnectionManager {
    /// Sets the alignment, then prints `text`.
    pub fn print_text(&self, text: impl Into<String>, align: Alignment) -> CommandTicket {
        let text = text.into();
        let description = format!("printText (align: {:?}, text: '{}')", align, text.trim_end());
        self.submit_operations(
            description,
            vec![
                PrinterOperation::SetAlignment(align),
                PrinterOperation::PrintText(text),
            ],
        )
    }

    pub fn print_text_with_font(
        &self,
        text: impl Into<String>,
        typeface: impl Into<String>,
        size: f32,
        align: Alignment,
    ) -> CommandTicket {
        let text = text.into();
        let typeface = typeface.into();
        let description = format!(
            "printTextWithFont (align: {:?}, font: {}, size: {}, text: '{}')",
            align,
            typeface,
            size,
            text.trim_end()
        );
        self.submit_operations(
            description,
            vec![
                PrinterOperation::SetAlignment(align),
                PrinterOperation::PrintTextWithFont {
                    text,
                    typeface,
                    size,
                },
            ],
        )
    }

    pub fn set_alignment(&self, align: Alignment) -> CommandTicket {
        self.submit_operations(
            format!("setAlignment (align: {:?})", align),
            vec![PrinterOperation::SetAlignment(align)],
        )
    }

    pub fn set_font_size(&self, size: f32) -> CommandTicket {
        self.submit_operations(
            format!("setFontSize (size: {})", size),
            vec![PrinterOperation::SetFontSize(size)],
        )
    }

    /// Feeds `count` blank lines.
    pub fn line_wrap(&self, count: u32) -> CommandTicket {
        self.submit_operations(
            format!("lineWrap (count: {})", count),
            vec![PrinterOperation::LineWrap(count)],
        )
    }

    pub fn print_qr_code(
        &self,
        data: impl Into<String>,
        module_size: u32,
        error_level: QrErrorLevel,
    ) -> CommandTicket {
        let data = data.into();
        let description = format!(
            "printQRCode (size: {}, error: {:?}, text: '{}')",
            module_size, error_level, data
        );
        self.submit_operations(
            description,
            vec![PrinterOperation::PrintQrCode {
                data,
                module_size,
                error_level,
            }],
        )
    }

    fn submit_operations(&self, description: String, operations: Vec<PrinterOperation>) -> CommandTicket {
        self.submit_command(description, move |service, reply| {
            for operation in &operations {
                service.invoke(operation, reply)?;
                debug!(request_id = %reply.request_id(), "{} command sent", operation.name());
            }
            Ok(())
        })
    }
}
